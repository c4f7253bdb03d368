//! SQLite-backed duplicate index.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};

use super::query::{size_param, Aggregate, Lookup, TableName};
use super::record::{FileRecord, IndexStats, NewRecord};
use super::{IndexError, IndexResult};

/// Upper bound on idle read connections kept for reuse.
const MAX_IDLE_READERS: usize = 16;

/// Point lookups against indexed records.
///
/// Implemented by the index itself (pooled read connections) and by
/// [`IndexTransaction`] (the connection holding the write lock), so the
/// classifier runs unchanged inside and outside the lock.
pub trait RecordLookup {
    /// Return at most one record matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if the query fails.
    fn lookup(&self, query: &Lookup<'_>) -> IndexResult<Option<FileRecord>>;
}

/// Persistent index of source-tree images.
#[derive(Debug)]
pub struct DuplicateIndex {
    table: TableName,
    path: Option<PathBuf>,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl DuplicateIndex {
    /// Open (or create) the index stored at `path`, using `table`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidTableName`] for a bad table name and
    /// [`IndexError::Open`] if the store cannot be opened or initialized.
    pub fn open(path: &Path, table: &str) -> IndexResult<Self> {
        let table = TableName::new(table)?;
        let open_err = |source: rusqlite::Error| IndexError::Open {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(open_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(open_err)?;
        log::debug!("SQLite pragmas configured (WAL mode) for {}", path.display());

        let index = Self {
            table,
            path: Some(path.to_path_buf()),
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
        };
        index.create_table().map_err(|e| match e {
            IndexError::Sqlite(source) => open_err(source),
            other => other,
        })?;
        Ok(index)
    }

    /// Open a private in-memory index. All access goes through one connection.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if the table name is invalid or SQLite fails.
    pub fn open_in_memory(table: &str) -> IndexResult<Self> {
        let table = TableName::new(table)?;
        let conn = Connection::open_in_memory().map_err(|source| IndexError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        let index = Self {
            table,
            path: None,
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
        };
        index.create_table()?;
        Ok(index)
    }

    /// Location of the backing file, `None` for in-memory indexes.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The table this index uses.
    #[must_use]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    fn create_table(&self) -> IndexResult<()> {
        let t = &self.table;
        let schema = format!(
            "CREATE TABLE IF NOT EXISTS \"{t}\" (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                filename        TEXT NOT NULL,
                full_path       TEXT NOT NULL UNIQUE,
                crc32           TEXT NOT NULL,
                content_hash    TEXT NOT NULL,
                average_hash    TEXT,
                perceptual_hash TEXT,
                difference_hash TEXT,
                wavelet_hash    TEXT,
                size            INTEGER NOT NULL CHECK (size > 0),
                media_type      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS \"{t}_content_hash_idx\" ON \"{t}\" (content_hash);
            CREATE INDEX IF NOT EXISTS \"{t}_name_size_idx\" ON \"{t}\" (filename, size);
            CREATE INDEX IF NOT EXISTS \"{t}_crc32_size_idx\" ON \"{t}\" (crc32, size);"
        );

        self.lock_writer()?.execute_batch(&schema)?;
        log::debug!("Index table '{}' ready", t);
        Ok(())
    }

    fn lock_writer(&self) -> IndexResult<MutexGuard<'_, Connection>> {
        self.writer.lock().map_err(|_| IndexError::LockPoisoned)
    }

    fn open_reader(&self, path: &Path) -> IndexResult<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;
        Ok(conn)
    }

    /// Run a read-only closure on a connection of its own.
    fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> IndexResult<T> {
        let Some(path) = self.path.as_deref() else {
            let conn = self.lock_writer()?;
            return Ok(f(&*conn)?);
        };

        let pooled = self
            .readers
            .lock()
            .map_err(|_| IndexError::LockPoisoned)?
            .pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => self.open_reader(path)?,
        };

        let result = f(&conn);

        if let Ok(mut readers) = self.readers.lock() {
            if readers.len() < MAX_IDLE_READERS {
                readers.push(conn);
            }
        }
        Ok(result?)
    }

    /// Hold the write lock for the duration of `f`, inside one IMMEDIATE
    /// transaction. The transaction commits only if `f` returns `Ok`.
    ///
    /// # Errors
    ///
    /// Propagates the error from `f`, or any SQLite failure.
    pub fn with_write_lock<T, E: From<IndexError>>(
        &self,
        f: impl FnOnce(&IndexTransaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut conn = self.lock_writer()?;
        let txn = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(IndexError::from)?;
        let value = {
            let handle = IndexTransaction {
                conn: &*txn,
                table: &self.table,
            };
            f(&handle)?
        };
        txn.commit().map_err(IndexError::from)?;
        Ok(value)
    }

    /// Append a record. Callers check [`RecordLookup::lookup`] first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DuplicatePath`] if the path is already indexed.
    pub fn insert(&self, record: &NewRecord) -> IndexResult<i64> {
        self.with_write_lock(|txn| txn.insert(record))
    }

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if the query fails.
    pub fn count(&self) -> IndexResult<u64> {
        let n = self.aggregate(Aggregate::Count)?;
        Ok(n as u64)
    }

    /// Evaluate a reporting aggregate.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if the query fails.
    pub fn aggregate(&self, kind: Aggregate) -> IndexResult<f64> {
        let sql = kind.sql(&self.table);
        self.with_reader(|conn| conn.query_row(&sql, [], |row| row.get::<_, f64>(0)))
    }

    /// All reporting aggregates from one consistent read.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if the query fails.
    pub fn stats(&self) -> IndexResult<IndexStats> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT media_type), COALESCE(SUM(size), 0), \
             COALESCE(AVG(size), 0.0) FROM \"{}\"",
            self.table
        );
        self.with_reader(|conn| {
            conn.query_row(&sql, [], |row| {
                Ok(IndexStats {
                    total_images: u64::try_from(row.get::<_, i64>(0)?).unwrap_or_default(),
                    image_types: u64::try_from(row.get::<_, i64>(1)?).unwrap_or_default(),
                    total_size: u64::try_from(row.get::<_, i64>(2)?).unwrap_or_default(),
                    average_size: row.get(3)?,
                })
            })
        })
    }
}

impl RecordLookup for DuplicateIndex {
    fn lookup(&self, query: &Lookup<'_>) -> IndexResult<Option<FileRecord>> {
        let sql = query.sql(&self.table);
        let params = query.params();
        self.with_reader(|conn| {
            conn.query_row(
                &sql,
                rusqlite::params_from_iter(params.iter()),
                FileRecord::from_row,
            )
            .optional()
        })
    }
}

/// The writer connection, borrowed while the write lock is held.
pub struct IndexTransaction<'a> {
    conn: &'a Connection,
    table: &'a TableName,
}

impl IndexTransaction<'_> {
    /// Insert a record within the locked transaction.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DuplicatePath`] if the path is already indexed.
    pub fn insert(&self, record: &NewRecord) -> IndexResult<i64> {
        let sql = format!(
            "INSERT INTO \"{}\" (filename, full_path, crc32, content_hash, average_hash, \
             perceptual_hash, difference_hash, wavelet_hash, size, media_type) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            self.table
        );
        let p = &record.perceptual;
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

        let result = self.conn.execute(
            &sql,
            params![
                record.filename,
                record.full_path,
                record.crc32,
                record.content_hash,
                non_empty(&p.average),
                non_empty(&p.perceptual),
                non_empty(&p.difference),
                non_empty(&p.wavelet),
                size_param(record.size),
                record.media_type,
            ],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(IndexError::DuplicatePath(record.full_path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl RecordLookup for IndexTransaction<'_> {
    fn lookup(&self, query: &Lookup<'_>) -> IndexResult<Option<FileRecord>> {
        let params = query.params();
        Ok(self
            .conn
            .query_row(
                &query.sql(self.table),
                rusqlite::params_from_iter(params.iter()),
                FileRecord::from_row,
            )
            .optional()?)
    }
}
