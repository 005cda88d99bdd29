//! SQLite-backed store for schedulable entities.
//!
//! Provides:
//! - CRUD for the entities the scheduler hands to calendar sync
//! - The ordered read path for batch jobs ([`EntitySource`])
//! - Durable recording of remote event ids ([`PersistenceSink`])

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use super::migrations;
use crate::error::{CoreError, DatabaseError};
use crate::sync::{EntitySource, PersistenceSink, SchedulableEntity, SyncError};

const ENTITY_COLUMNS: &str =
    "id, title, description, location, start_time, end_time, remote_event_id";

/// SQLite database for schedulable entities.
pub struct EntityDb {
    conn: Mutex<Connection>,
}

impl EntityDb {
    /// Open the database at `<data dir>/studysync.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_default() -> Result<Self, CoreError> {
        let path = data_dir()?.join("studysync.db");
        Ok(Self::open(&path)?)
    }

    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, DatabaseError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DatabaseError::QueryFailed("connection mutex poisoned".into()))?;
        Ok(f(&conn)?)
    }

    /// Insert or replace an entity.
    ///
    /// An existing `remote_event_id` is kept when the incoming entity has none,
    /// so re-importing a schedule does not orphan remote events.
    pub fn upsert_entity(&self, entity: &SchedulableEntity) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO schedulable_entities
                    (id, title, description, location, start_time, end_time, remote_event_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    location = excluded.location,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time,
                    remote_event_id = COALESCE(excluded.remote_event_id, remote_event_id),
                    updated_at = excluded.updated_at",
                params![
                    entity.id,
                    entity.title,
                    entity.description,
                    entity.location,
                    entity.start_time.to_rfc3339(),
                    entity.end_time.to_rfc3339(),
                    entity.remote_event_id,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_entity(&self, id: &str) -> Result<Option<SchedulableEntity>, DatabaseError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM schedulable_entities WHERE id = ?1"),
                params![id],
                row_to_entity,
            )
            .optional()
        })
    }

    /// All entities ordered by start time.
    pub fn list_entities(&self) -> Result<Vec<SchedulableEntity>, DatabaseError> {
        self.query_entities(&format!(
            "SELECT {ENTITY_COLUMNS} FROM schedulable_entities ORDER BY start_time, id"
        ))
    }

    /// Entities a batch job should reconcile, in deterministic order.
    pub fn list_eligible(&self) -> Result<Vec<SchedulableEntity>, DatabaseError> {
        self.query_entities(&format!(
            "SELECT {ENTITY_COLUMNS} FROM schedulable_entities
             WHERE sync_eligible = 1 ORDER BY start_time, id"
        ))
    }

    fn query_entities(&self, sql: &str) -> Result<Vec<SchedulableEntity>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], row_to_entity)?;
            rows.collect()
        })
    }

    /// Include or exclude an entity from batch runs.
    pub fn set_sync_eligible(&self, id: &str, eligible: bool) -> Result<(), DatabaseError> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE schedulable_entities SET sync_eligible = ?2 WHERE id = ?1",
                params![id, eligible],
            )
        })?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Record the remote event id owning `id`.
    pub fn set_remote_event_id(&self, id: &str, remote_id: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE schedulable_entities
                 SET remote_event_id = ?2, remote_synced_at = ?3
                 WHERE id = ?1",
                params![id, remote_id, now],
            )
        })?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn delete_entity(&self, id: &str) -> Result<bool, DatabaseError> {
        let changed = self.with_conn(|conn| {
            conn.execute("DELETE FROM schedulable_entities WHERE id = ?1", params![id])
        })?;
        Ok(changed > 0)
    }
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<SchedulableEntity> {
    Ok(SchedulableEntity {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        start_time: parse_timestamp(row, 4)?,
        end_time: parse_timestamp(row, 5)?,
        remote_event_id: row.get(6)?,
    })
}

impl From<DatabaseError> for SyncError {
    fn from(err: DatabaseError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

#[async_trait]
impl PersistenceSink for EntityDb {
    async fn set_remote_id(&self, entity_id: &str, remote_id: &str) -> Result<(), SyncError> {
        Ok(self.set_remote_event_id(entity_id, remote_id)?)
    }
}

#[async_trait]
impl EntitySource for EntityDb {
    async fn eligible_entities(&self) -> Result<Vec<SchedulableEntity>, SyncError> {
        Ok(self.list_eligible()?)
    }
}
