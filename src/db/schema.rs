//! Database schema and migrations

use rusqlite::Connection;

use crate::{Error, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// Safe to run against an already-migrated database; only missing
/// migrations are applied.
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        BEGIN;

        -- Conversation registry
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Append-only message log, one ordered partition per conversation
        CREATE TABLE IF NOT EXISTS messages (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sequence INTEGER NOT NULL CHECK(sequence >= 0),
            role TEXT NOT NULL CHECK(role IN ('system', 'human', 'ai')),
            text TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (conversation_id, sequence)
        ) WITHOUT ROWID;

        PRAGMA user_version = 1;

        COMMIT;
        ",
    )
    .map_err(|e| Error::StorageUnavailable(format!("migration v1: {e}")))?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        BEGIN;

        -- Committed messages are immutable
        CREATE TRIGGER IF NOT EXISTS messages_no_update
        BEFORE UPDATE ON messages
        BEGIN
            SELECT RAISE(ABORT, 'messages are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS messages_no_delete
        BEFORE DELETE ON messages
        BEGIN
            SELECT RAISE(ABORT, 'messages are append-only');
        END;

        PRAGMA user_version = 2;

        COMMIT;
        ",
    )
    .map_err(|e| Error::StorageUnavailable(format!("migration v2: {e}")))?;

    tracing::info!("migrated to schema v2 (append-only triggers)");
    Ok(())
}
