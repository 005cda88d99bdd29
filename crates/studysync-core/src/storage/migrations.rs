//! Database schema migrations for the entity store.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use tracing::warn;

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    match conn
        .query_row("SELECT version FROM schema_version", [], |row| {
            row.get::<_, i32>(0)
        })
        .optional()
    {
        Ok(version) => version.unwrap_or(0),
        Err(e) => {
            warn!(error = %e, "failed to read schema_version");
            0
        }
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: schedulable entities and their remote event mapping.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schedulable_entities (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            description     TEXT,
            location        TEXT,
            start_time      TEXT NOT NULL,
            end_time        TEXT NOT NULL,
            remote_event_id TEXT,
            sync_eligible   INTEGER NOT NULL DEFAULT 1,
            updated_at      TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: remember when the remote mapping was last written and
/// index the batch ordering.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE schedulable_entities ADD COLUMN remote_synced_at TEXT;
         CREATE INDEX IF NOT EXISTS idx_entities_eligible_start
             ON schedulable_entities(sync_eligible, start_time, id);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}
