//! Structured lookup predicates and aggregate queries.

use rusqlite::ToSql;

use super::IndexError;

/// Longest accepted table name.
const MAX_TABLE_NAME_LEN: usize = 64;

/// Columns selected for every record lookup, in [`super::FileRecord`] order.
pub(crate) const RECORD_COLUMNS: &str = "id, filename, full_path, crc32, content_hash, \
     average_hash, perceptual_hash, difference_hash, wavelet_hash, size, media_type";

/// A validated SQL table name (`[A-Za-z_][A-Za-z0-9_]*`, at most 64 characters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    /// Validate a table name.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidTableName`] for anything that is not a
    /// plain identifier.
    pub fn new(name: &str) -> Result<Self, IndexError> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_start && valid_rest && name.len() <= MAX_TABLE_NAME_LEN {
            Ok(Self(name.to_string()))
        } else {
            Err(IndexError::InvalidTableName(name.to_string()))
        }
    }

    /// The raw name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An equality predicate selecting at most one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Same content hash (precise policy)
    ContentHash(&'a str),
    /// Same filename and size (fast policy, first stage)
    NameAndSize {
        /// NFC-normalized filename
        filename: &'a str,
        /// Size in bytes
        size: u64,
    },
    /// Same CRC32 and size (fast policy, checksum fallback)
    Crc32AndSize {
        /// CRC32 as 8 hex characters
        crc32: &'a str,
        /// Size in bytes
        size: u64,
    },
    /// Same filename, size and CRC32 (fast policy, confirming a name+size hit)
    NameSizeAndCrc32 {
        /// NFC-normalized filename
        filename: &'a str,
        /// Size in bytes
        size: u64,
        /// CRC32 as 8 hex characters
        crc32: &'a str,
    },
    /// Exact path
    Path(&'a str),
}

impl Lookup<'_> {
    fn where_clause(&self) -> &'static str {
        match self {
            Self::ContentHash(_) => "content_hash = ?1",
            Self::NameAndSize { .. } => "filename = ?1 AND size = ?2",
            Self::Crc32AndSize { .. } => "crc32 = ?1 AND size = ?2",
            Self::NameSizeAndCrc32 { .. } => "filename = ?1 AND size = ?2 AND crc32 = ?3",
            Self::Path(_) => "full_path = ?1",
        }
    }

    /// Full statement text for this predicate against `table`.
    pub(crate) fn sql(&self, table: &TableName) -> String {
        format!(
            "SELECT {RECORD_COLUMNS} FROM \"{table}\" WHERE {} LIMIT 1",
            self.where_clause()
        )
    }

    /// Statement parameters, in placeholder order.
    pub(crate) fn params(&self) -> Vec<Box<dyn ToSql + '_>> {
        let (text, size, crc32) = match *self {
            Self::ContentHash(v) | Self::Path(v) => (v, None, None),
            Self::NameAndSize { filename, size } => (filename, Some(size), None),
            Self::Crc32AndSize { crc32, size } => (crc32, Some(size), None),
            Self::NameSizeAndCrc32 {
                filename,
                size,
                crc32,
            } => (filename, Some(size), Some(crc32)),
        };

        let mut params: Vec<Box<dyn ToSql + '_>> = vec![Box::new(text)];
        if let Some(size) = size {
            params.push(Box::new(size_param(size)));
        }
        if let Some(crc32) = crc32 {
            params.push(Box::new(crc32));
        }
        params
    }
}

impl std::fmt::Display for Lookup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentHash(h) => write!(f, "content_hash={h}"),
            Self::NameAndSize { filename, size } => write!(f, "filename={filename}, size={size}"),
            Self::Crc32AndSize { crc32, size } => write!(f, "crc32={crc32}, size={size}"),
            Self::NameSizeAndCrc32 {
                filename,
                size,
                crc32,
            } => write!(f, "filename={filename}, size={size}, crc32={crc32}"),
            Self::Path(p) => write!(f, "full_path={p}"),
        }
    }
}

/// SQLite integers are signed; sizes beyond `i64::MAX` cannot exist on disk.
pub(crate) fn size_param(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Reporting aggregates over the whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Number of records
    Count,
    /// Number of distinct media types
    DistinctMediaTypes,
    /// Sum of sizes in bytes
    TotalSize,
    /// Mean size in bytes
    AverageSize,
}

impl Aggregate {
    pub(crate) fn sql(self, table: &TableName) -> String {
        let expr = match self {
            Self::Count => "COUNT(*)",
            Self::DistinctMediaTypes => "COUNT(DISTINCT media_type)",
            Self::TotalSize => "COALESCE(SUM(size), 0)",
            Self::AverageSize => "COALESCE(AVG(size), 0.0)",
        };
        format!("SELECT {expr} FROM \"{table}\"")
    }
}
