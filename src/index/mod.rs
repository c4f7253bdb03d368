//! Persisted duplicate index.
//!
//! One SQLite table holds a row per ingested source file. Lookups are point
//! queries built from structured [`Lookup`] predicates; every value is bound
//! as a statement parameter and the validated table name is the only text
//! ever placed into SQL.
//!
//! # Concurrency
//!
//! Mutations (table creation, inserts) go through a single writer connection
//! behind a mutex, which doubles as the process-level write lock. Reads use a
//! small pool of read-only connections on file-backed indexes, so each worker
//! queries through its own handle and sees a consistent snapshot per call.
//!
//! - [`database`]: connection management and the [`DuplicateIndex`] type
//! - [`query`]: table name validation, lookup predicates and aggregates
//! - [`record`]: stored and to-be-stored rows

pub mod database;
pub mod query;
pub mod record;

use std::path::PathBuf;

pub use database::{DuplicateIndex, IndexTransaction, RecordLookup};
pub use query::{Aggregate, Lookup, TableName};
pub use record::{FileRecord, IndexStats, NewRecord};

/// Errors that can occur while using the duplicate index.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The backing store could not be opened or initialized.
    #[error("Failed to open index at {path}: {source}")]
    Open {
        /// Location of the store
        path: PathBuf,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// The configured table name is not a plain SQL identifier.
    #[error("Invalid table name '{0}': use letters, digits and underscores (max 64 characters)")]
    InvalidTableName(String),

    /// A record with this path is already indexed.
    #[error("Path already indexed: {0}")]
    DuplicatePath(String),

    /// A fingerprint lacked a signal required for storage.
    #[error("Incomplete fingerprint for {0}: content hash missing")]
    IncompleteRecord(PathBuf),

    /// A lock guarding a connection was poisoned by a panicking thread.
    #[error("Index lock poisoned")]
    LockPoisoned,

    /// Any other SQLite failure.
    #[error("Index query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
