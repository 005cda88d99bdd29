//! Local-side capabilities: where entities come from and where remote ids go.

use async_trait::async_trait;

use super::error::SyncError;
use super::types::SchedulableEntity;

/// Durable store for the entity → remote event mapping.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Record `remote_id` as the owner of `entity_id`.
    ///
    /// Must be idempotent: repeating the call with the same value is a no-op.
    async fn set_remote_id(&self, entity_id: &str, remote_id: &str) -> Result<(), SyncError>;
}

/// Read path supplying the ordered entities eligible for one sync job.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn eligible_entities(&self) -> Result<Vec<SchedulableEntity>, SyncError>;
}
