//! Database module - SQLite with WAL mode for crash-safe persistence.
//!
//! This module provides connection management with optimized PRAGMAs and
//! the transactional-store capability the conflict retry executor builds on.
//! Every transaction runs on its own connection, so a retried attempt always
//! starts from a fresh handle.

mod ops;
mod retry;
mod schema;

pub use ops::*;
pub use retry::*;

use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{AppError, Result};

/// Default time SQLite waits on a locked database before reporting busy.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Locking mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Deferred transaction, takes the write lock only if it writes
    Read,
    /// Immediate transaction, takes the write lock up front
    Write,
}

/// A store that can run a unit of work inside a single transaction.
///
/// Implementations commit when `work` succeeds and roll back otherwise.
/// Conflicts must surface as errors for which
/// [`AppError::is_transient`] is true.
pub trait TransactionalStore {
    /// Handle the unit of work operates on
    type Handle;

    fn execute_in_transaction<T, F>(&self, mode: TxMode, work: F) -> Result<T>
    where
        F: FnOnce(&Self::Handle) -> Result<T>;
}

/// Map a SQLite error, classifying busy/locked as a transient conflict.
pub(crate) fn sqlite_error(e: rusqlite::Error, context: &str) -> AppError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            AppError::Conflict(format!("{}: {}", context, e))
        }
        _ => AppError::Database(format!("{}: {}", context, e)),
    }
}

/// Database handle: the file location plus connection settings.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Open a new connection configured with the database PRAGMAs.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(|e| sqlite_error(e, "Failed to open database"))?;
        configure(&conn, self.busy_timeout)?;
        Ok(conn)
    }
}

impl TransactionalStore for Database {
    type Handle = Connection;

    fn execute_in_transaction<T, F>(&self, mode: TxMode, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.connect()?;
        let behavior = match mode {
            TxMode::Read => TransactionBehavior::Deferred,
            TxMode::Write => TransactionBehavior::Immediate,
        };

        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(|e| sqlite_error(e, "Failed to start transaction"))?;

        // Dropping the transaction on error rolls it back
        let value = work(&tx)?;

        tx.commit()
            .map_err(|e| sqlite_error(e, "Failed to commit transaction"))?;

        Ok(value)
    }
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    // Configure WAL mode - persists to the database file
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| sqlite_error(e, "Failed to set journal_mode"))?;

    // NORMAL synchronous is safe in WAL mode, faster than FULL
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(|e| sqlite_error(e, "Failed to set synchronous"))?;

    // Store temp tables in memory
    conn.pragma_update(None, "temp_store", "MEMORY")
        .map_err(|e| sqlite_error(e, "Failed to set temp_store"))?;

    conn.pragma_update(None, "busy_timeout", busy_timeout.as_millis() as i64)
        .map_err(|e| sqlite_error(e, "Failed to set busy_timeout"))?;

    Ok(())
}

/// Open the database with the default busy timeout.
///
/// See [`open_database_with`].
pub fn open_database(path: &Path) -> Result<Database> {
    open_database_with(path, DEFAULT_BUSY_TIMEOUT)
}

/// Open a database file, creating it and its schema if needed.
///
/// This function:
/// 1. Creates parent directory if it doesn't exist
/// 2. Opens a connection and configures WAL mode
/// 3. Initializes schema (creates tables if needed)
///
/// The connection used for setup is closed again; transactions open their own.
pub fn open_database_with(path: &Path, busy_timeout: Duration) -> Result<Database> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database {
        path: path.to_path_buf(),
        busy_timeout,
    };

    let conn = db.connect()?;
    schema::init(&conn)?;

    tracing::debug!("Database ready at {:?}", path);
    Ok(db)
}
