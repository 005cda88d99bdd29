//! Core types for calendar reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A locally-owned item that can be pinned to the external calendar:
/// a class session, a study block, or a scheduled task.
///
/// The reconciliation engine only ever writes `remote_event_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulableEntity {
    /// Stable local identifier.
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Identifier of the remote event that owns this entity, if known.
    pub remote_event_id: Option<String>,
}

impl SchedulableEntity {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            location: None,
            start_time,
            end_time,
            remote_event_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_remote_event_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_event_id = Some(remote_id.into());
        self
    }

    /// Check `end_time >= start_time`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_time < self.start_time {
            return Err(ValidationError::InvalidTimeRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }
}

/// Per-item outcome of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    Updated,
    Failed(String),
}

/// A single failed item in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub entity_id: String,
    pub message: String,
}

/// Aggregate report of one batch run. Built fresh per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub created: usize,
    pub updated: usize,
    /// Failed items, in processing order.
    pub errors: Vec<SyncFailure>,
}

impl SyncResult {
    pub fn record(&mut self, entity_id: &str, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Created => self.created += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Failed(message) => self.errors.push(SyncFailure {
                entity_id: entity_id.to_string(),
                message: message.clone(),
            }),
        }
    }

    /// Number of items that reached the remote successfully.
    pub fn synced(&self) -> usize {
        self.created + self.updated
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The external calendar that holds one user's synced schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContainer {
    pub id: String,
    pub summary: Option<String>,
    pub time_zone: Option<String>,
}

/// The parts of a remote event the engine reads back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: Option<DateTime<Utc>>,
}

/// Provenance link written on every remote event so external viewers can
/// trace it back to the owning entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlink {
    pub title: String,
    pub url: String,
}

/// Provider-neutral body sent on insert and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Local entity id, stored as private provenance metadata.
    pub entity_id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// RFC 3339 instant rendered in `time_zone`.
    pub start: String,
    /// RFC 3339 instant rendered in `time_zone`.
    pub end: String,
    /// IANA zone name.
    pub time_zone: String,
    /// Fixed category marker for every synced event.
    pub category: String,
    pub source: Backlink,
}
