//! Database layer for the consultation engine.

mod schema;
mod patients;
mod encounters;
mod stock;
mod orders;
mod billing;

pub use schema::*;
#[allow(unused_imports)]
pub use patients::*;
#[allow(unused_imports)]
pub use encounters::*;
#[allow(unused_imports)]
pub use stock::*;
#[allow(unused_imports)]
pub use orders::*;
#[allow(unused_imports)]
pub use billing::*;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;

/// Default time a connection waits for another writer to finish.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
///
/// One `Database` owns one connection. Threads that need to work in
/// parallel open their own `Database` against the same file.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open database at path with an explicit busy timeout.
    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin an IMMEDIATE transaction.
    ///
    /// The write lock is taken up front, so reads made inside the
    /// transaction cannot be invalidated by another writer before commit.
    /// Every `Database` method called while the returned guard is alive runs
    /// inside it; dropping the guard without `commit()` rolls back.
    pub fn begin_immediate(&self) -> DbResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

/// Format a timestamp for storage. Fixed width so text order is time order.
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored timestamp.
pub(crate) fn from_db_time(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Constraint(format!("Invalid timestamp {:?}: {}", s, e)))
}

pub(crate) fn from_db_time_opt(s: Option<String>) -> DbResult<Option<DateTime<Utc>>> {
    s.as_deref().map(from_db_time).transpose()
}
