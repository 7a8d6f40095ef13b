//! Database module for conversation history persistence

pub mod history;
mod schema;

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::{Error, Result};

pub use history::{ConversationSummary, HistoryStore, Message, MessageRole};
pub use schema::SCHEMA_VERSION;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// How long a writer waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for a pooled connection
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the database
///
/// Creates the parent directory when missing.
///
/// # Errors
///
/// Returns `StorageUnavailable` if database cannot be opened or initialized
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::StorageUnavailable(format!("{}: {e}", parent.display()))
        })?;
    }

    let manager =
        SqliteConnectionManager::file(path).with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
    let pool = Pool::builder()
        .max_size(4)
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

    // Run migrations on first connection
    let conn = pool
        .get()
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    schema::init(&conn)?;

    tracing::info!(path = %path.display(), version = SCHEMA_VERSION, "database initialized");
    Ok(pool)
}

/// Initialize an in-memory database (for testing)
///
/// # Errors
///
/// Returns `StorageUnavailable` if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

    let conn = pool
        .get()
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    schema::init(&conn)?;

    Ok(pool)
}
