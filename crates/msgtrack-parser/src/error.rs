use nom::error::{ErrorKind, FromExternalError, ParseError};
use serde::Serialize;
use thiserror::Error;

/// Why a line ended up as an unknown record. None of these is fatal; the
/// dispatcher forwards the raw line and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ClassifyError {
    #[error("line does not start with a maillog header")]
    PrefixMismatch,
    #[error("no grammar matched the line")]
    VariantMismatch,
    #[error("invalid value for `{field}`: {token}")]
    FieldCoercion { field: &'static str, token: String },
}

impl ClassifyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PrefixMismatch => "PREFIX_MISMATCH",
            Self::VariantMismatch => "VARIANT_MISMATCH",
            Self::FieldCoercion { .. } => "FIELD_COERCION",
        }
    }

    pub(crate) fn coercion(
        field: &'static str,
        token: impl Into<String>
    ) -> Self {
        Self::FieldCoercion { field, token: token.into() }
    }
}

/// nom error used by the grammars. It only keeps what the classifier needs:
/// a plain mismatch, or a token that had the right shape but failed to
/// convert into its field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GrammarError<'a> {
    Mismatch(&'a str),
    Coercion { field: &'static str, token: &'a str },
}

impl<'a> ParseError<&'a str> for GrammarError<'a> {
    fn from_error_kind(
        input: &'a str,
        _kind: ErrorKind
    ) -> Self {
        Self::Mismatch(input)
    }

    fn append(
        _input: &'a str,
        _kind: ErrorKind,
        other: Self
    ) -> Self {
        other
    }

    fn or(
        self,
        other: Self
    ) -> Self {
        match self {
            Self::Coercion { .. } => self,
            Self::Mismatch(_) => other,
        }
    }
}

/// Conversion failure raised from inside `map_res`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InvalidField<'a> {
    pub field: &'static str,
    pub token: &'a str,
}

impl<'a> FromExternalError<&'a str, InvalidField<'a>> for GrammarError<'a> {
    fn from_external_error(
        _input: &'a str,
        _kind: ErrorKind,
        err: InvalidField<'a>
    ) -> Self {
        Self::Coercion { field: err.field, token: err.token }
    }
}

impl From<GrammarError<'_>> for ClassifyError {
    fn from(err: GrammarError<'_>) -> Self {
        match err {
            GrammarError::Mismatch(_) => Self::VariantMismatch,
            GrammarError::Coercion { field, token } => {
                Self::coercion(field, token)
            }
        }
    }
}
