//! Single-entity sync for callers waiting on a definite answer.
//!
//! Uses the same [`Resolver`] as the batch path with the tighter
//! [`BackoffPolicy::on_demand`] preset and no chunking.

use std::sync::Arc;

use tracing::info;

use super::backoff::BackoffPolicy;
use super::error::SyncError;
use super::resolver::Resolver;
use super::sink::PersistenceSink;
use super::types::SchedulableEntity;

pub struct OnDemandSync {
    resolver: Resolver,
    sink: Arc<dyn PersistenceSink>,
    policy: BackoffPolicy,
}

impl OnDemandSync {
    pub fn new(resolver: Resolver, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            resolver,
            sink,
            policy: BackoffPolicy::on_demand(),
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reconcile one entity and return its remote event id.
    ///
    /// Errors are surfaced to the caller: a permanent failure as-is, an
    /// exhausted retry budget as [`SyncError::RetriesExhausted`]. The
    /// persistence sink is only written after the remote mutation succeeded.
    #[tracing::instrument(skip_all, fields(entity_id = %entity.id))]
    pub async fn sync_one(&self, entity: &SchedulableEntity) -> Result<String, SyncError> {
        let mut state = self.policy.initial_state();
        let resolution = self
            .resolver
            .resolve_with_backoff(entity, &self.policy, &mut state)
            .await?;

        self.sink
            .set_remote_id(&entity.id, &resolution.remote_id)
            .await?;

        info!(remote_id = %resolution.remote_id, outcome = ?resolution.outcome, "entity synced");
        Ok(resolution.remote_id)
    }
}
