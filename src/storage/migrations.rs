//! Database migrations for casesync.
//!
//! Each migration creates the collections introduced by one schema version.
//! Migrations are run automatically when the database is opened, starting
//! after the version recorded in `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::info;

use super::collections::Collection;
use crate::error::SyncError;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 4;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, SyncError> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| SyncError::Database(format!("Failed to get schema version: {e}")))?;

    Ok(version)
}

/// Set the schema version in the database.
fn set_version(conn: &Connection, version: i32) -> Result<(), SyncError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| SyncError::Database(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), SyncError> {
    run_to(conn, CURRENT_VERSION)
}

/// Run pending migrations up to `target`.
pub fn run_to(conn: &Connection, target: i32) -> Result<(), SyncError> {
    let current = get_version(conn)?;

    if current >= target {
        return Ok(());
    }

    for version in (current + 1)..=target {
        run_migration(conn, version)?;
        set_version(conn, version)?;
        info!(version, "applied store migration");
    }

    Ok(())
}

/// Run a specific migration.
fn run_migration(conn: &Connection, version: i32) -> Result<(), SyncError> {
    match version {
        1..=CURRENT_VERSION => create_collections(conn, version),
        _ => Err(SyncError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Create every collection introduced in `version`.
///
/// Each collection is a table keyed by the document id, with an
/// auto-increment sequence for documents that arrive without one and an
/// index on the document `type`.
fn create_collections(conn: &Connection, version: i32) -> Result<(), SyncError> {
    for collection in Collection::introduced_in(version) {
        let name = collection.as_str();
        conn.execute_batch(&format!(
            r"
            CREATE TABLE IF NOT EXISTS {name} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT UNIQUE,
                type TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{name}_type
            ON {name}(type);
            "
        ))
        .map_err(|e| SyncError::Database(format!("Migration v{version} failed on {name}: {e}")))?;
    }
    Ok(())
}

/// Whether the table backing `collection` exists.
pub fn has_collection(conn: &Connection, collection: Collection) -> Result<bool, SyncError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [collection.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| SyncError::Database(format!("Failed to inspect schema: {e}")))?;
    Ok(count > 0)
}
