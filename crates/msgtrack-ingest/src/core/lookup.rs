use std::collections::HashMap;
use std::fmt;

/// Normalized-value tables referenced by id from the line tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupTable {
    SaslMethod,
    SaslUsername,
    MailAddress,
    Status,
}

impl LookupTable {
    pub const ALL: [LookupTable; 4] = [
        Self::SaslMethod,
        Self::SaslUsername,
        Self::MailAddress,
        Self::Status,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::SaslMethod => "sasl_method",
            Self::SaslUsername => "sasl_username",
            Self::MailAddress => "mail_address",
            Self::Status => "status",
        }
    }

    /// Longest value the `name` column accepts.
    pub fn max_len(&self) -> usize {
        match self {
            Self::SaslMethod | Self::Status => 64,
            Self::SaslUsername | Self::MailAddress => 255,
        }
    }
}

impl fmt::Display for LookupTable {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>
    ) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// In-memory `value -> id` map per lookup table, so repeated addresses and
/// statuses cost one database round trip per process.
#[derive(Debug, Default)]
pub struct LookupCache {
    tables: HashMap<LookupTable, HashMap<String, u32>>,
}

impl LookupCache {
    /// Trimmed key, or `None` when nothing is left to store.
    pub fn key(value: &str) -> Option<&str> {
        let trimmed = value.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }

    pub fn get(
        &self,
        table: LookupTable,
        key: &str
    ) -> Option<u32> {
        self.tables.get(&table)?.get(key).copied()
    }

    pub fn insert(
        &mut self,
        table: LookupTable,
        key: &str,
        id: u32
    ) {
        self.tables.entry(table).or_default().insert(key.to_string(), id);
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }
}
