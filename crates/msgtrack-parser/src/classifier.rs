use chrono::{Datelike, Local};
use tracing::trace;

use crate::error::{ClassifyError, GrammarError};
use crate::grammar;
use crate::prefix;
use crate::record::{Header, Record, RecordKind, UnknownRecord};

type QueuedGrammar =
    for<'a> fn(&Header, &str, &'a str) -> Result<Record, GrammarError<'a>>;
type NoQueueGrammar =
    for<'a> fn(&Header, &'a str) -> Result<Record, GrammarError<'a>>;

#[derive(Clone, Copy)]
enum Matcher {
    /// Needs `QUEUEID:` right after the header.
    Queued(QueuedGrammar),
    /// Continues directly after the header.
    NoQueue(NoQueueGrammar),
}

#[derive(Clone, Copy)]
struct Variant {
    kind: RecordKind,
    matcher: Matcher,
}

/// Priority order. Host-fail accepts any queue-id payload, so every fixed
/// field grammar has to run before it.
const VARIANTS: [Variant; 6] = [
    Variant {
        kind: RecordKind::Client,
        matcher: Matcher::Queued(grammar::client),
    },
    Variant {
        kind: RecordKind::MessageId,
        matcher: Matcher::Queued(grammar::message_id),
    },
    Variant { kind: RecordKind::From, matcher: Matcher::Queued(grammar::from) },
    Variant { kind: RecordKind::Sent, matcher: Matcher::Queued(grammar::sent) },
    Variant {
        kind: RecordKind::HostFail,
        matcher: Matcher::Queued(grammar::host_fail),
    },
    Variant {
        kind: RecordKind::Reject,
        matcher: Matcher::NoQueue(grammar::reject),
    },
];

/// Classifies maillog lines into typed records.
///
/// Built once and reused for every line. The only state is the year used to
/// complete syslog dates, which carry no year of their own: a batch that
/// spans new year and is processed after it gets the later year for all of
/// its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    year: i32,
}

impl Classifier {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    /// Classifier dated with the local clock's year at construction time.
    pub fn for_current_year() -> Self {
        Self::new(Local::now().year())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Grammars in the order they are tried.
    pub fn order(&self) -> [RecordKind; 6] {
        VARIANTS.map(|variant| variant.kind)
    }

    /// Never fails: lines no grammar accepts come back as
    /// [`Record::Unknown`] holding the untouched text and the reason.
    pub fn classify(
        &self,
        line: &str
    ) -> Record {
        match self.try_classify(line) {
            Ok(record) => record,
            Err(reason) => Record::Unknown(UnknownRecord {
                raw_text: line.to_string(),
                reason
            }),
        }
    }

    /// Tries every grammar in priority order and returns the first one that
    /// consumes the whole line.
    ///
    /// When all of them miss, a field coercion failure seen along the way is
    /// reported in preference to a plain mismatch.
    pub fn try_classify(
        &self,
        line: &str
    ) -> Result<Record, ClassifyError> {
        let (rest, header) = self.parse_header(line)?;
        let queued = prefix::queue_id(rest).ok();
        let mut failure: Option<ClassifyError> = None;

        for variant in VARIANTS {
            let attempt = match (variant.matcher, queued) {
                (Matcher::Queued(grammar), Some((payload, queue_id))) => {
                    grammar(&header, queue_id, payload)
                }
                (Matcher::Queued(_), None) => continue,
                (Matcher::NoQueue(grammar), _) => grammar(&header, rest),
            };

            match attempt {
                Ok(record) => return Ok(record),
                Err(err) => {
                    trace!("grammar miss: kind={}, error={:?}", variant.kind, err);
                    let err = ClassifyError::from(err);
                    if matches!(err, ClassifyError::FieldCoercion { .. })
                        && !matches!(
                            failure,
                            Some(ClassifyError::FieldCoercion { .. })
                        )
                    {
                        failure = Some(err);
                    }
                }
            }
        }

        Err(failure.unwrap_or(ClassifyError::VariantMismatch))
    }

    /// Runs a single grammar, ignoring priority. Useful to check what a
    /// lower priority grammar would have made of a line.
    pub fn try_variant(
        &self,
        kind: RecordKind,
        line: &str
    ) -> Result<Record, ClassifyError> {
        let variant = VARIANTS
            .into_iter()
            .find(|variant| variant.kind == kind)
            .ok_or(ClassifyError::VariantMismatch)?;
        let (rest, header) = self.parse_header(line)?;

        let attempt = match variant.matcher {
            Matcher::Queued(grammar) => {
                let (payload, queue_id) = prefix::queue_id(rest)
                    .map_err(|_| ClassifyError::VariantMismatch)?;
                grammar(&header, queue_id, payload)
            }
            Matcher::NoQueue(grammar) => grammar(&header, rest),
        };

        attempt.map_err(ClassifyError::from)
    }

    fn parse_header<'a>(
        &self,
        line: &'a str
    ) -> Result<(&'a str, Header), ClassifyError> {
        match prefix::header(line) {
            Ok((rest, raw)) => Ok((rest, raw.normalize(self.year)?)),
            Err(
                nom::Err::Error(GrammarError::Coercion { field, token })
                | nom::Err::Failure(GrammarError::Coercion { field, token }),
            ) => Err(ClassifyError::coercion(field, token)),
            Err(_) => Err(ClassifyError::PrefixMismatch),
        }
    }
}
