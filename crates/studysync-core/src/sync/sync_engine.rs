//! Batch orchestration: drives the resolver over many entities.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::backoff::{BackoffPolicy, BackoffState};
use super::error::SyncError;
use super::lock::SyncLock;
use super::resolver::{with_backoff, Resolver};
use super::sink::{EntitySource, PersistenceSink};
use super::types::{SchedulableEntity, SyncOutcome, SyncResult};

/// Default number of entities processed between throttling pauses.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Sync engine for bulk runs.
///
/// Entities are processed one at a time, in the order given, so a single
/// [`BackoffState`] stays coherent and the remote per-user quota is never hit
/// by concurrent requests. One engine serves one user's calendar.
pub struct SyncEngine {
    resolver: Resolver,
    sink: Arc<dyn PersistenceSink>,
    policy: BackoffPolicy,
    chunk_size: usize,
}

impl SyncEngine {
    /// Create a new engine with the batch backoff preset.
    pub fn new(resolver: Resolver, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            resolver,
            sink,
            policy: BackoffPolicy::batch(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Reconcile every entity with the remote calendar.
    ///
    /// Per-item failures never abort the run; they are collected in
    /// [`SyncResult::errors`]. The only `Err` is a run-level failure: the
    /// calendar container itself could not be reached.
    #[tracing::instrument(skip_all, fields(container = %self.resolver.container_id(), total = entities.len()))]
    pub async fn sync_all(&self, entities: &[SchedulableEntity]) -> Result<SyncResult, SyncError> {
        let mut state = self.policy.initial_state();
        self.check_container(&mut state).await?;

        let mut result = SyncResult::default();
        let chunk_count = entities.len().div_ceil(self.chunk_size);

        for (index, chunk) in entities.chunks(self.chunk_size).enumerate() {
            for entity in chunk {
                let outcome = self.sync_item(entity, &mut state).await;
                result.record(&entity.id, &outcome);
            }

            if index + 1 < chunk_count {
                debug!(
                    chunk = index,
                    delay_ms = u64::try_from(state.current_delay.as_millis()).unwrap_or(u64::MAX),
                    "throttling before next chunk"
                );
                tokio::time::sleep(state.current_delay).await;
            }
        }

        info!(
            created = result.created,
            updated = result.updated,
            failed = result.errors.len(),
            "sync run finished"
        );
        Ok(result)
    }

    /// Run a complete job for `user_id`: take the advisory lock, load the
    /// eligible entities, and sync them.
    pub async fn run_job(
        &self,
        source: &dyn EntitySource,
        lock_dir: &Path,
        user_id: &str,
    ) -> Result<SyncResult, SyncError> {
        let _lock = SyncLock::acquire(lock_dir, user_id)?;
        let entities = source.eligible_entities().await?;
        info!(user = user_id, count = entities.len(), "starting sync job");
        self.sync_all(&entities).await
    }

    async fn check_container(&self, state: &mut BackoffState) -> Result<(), SyncError> {
        let client = self.resolver.client();
        let container_id = self.resolver.container_id();
        let container = with_backoff(&self.policy, state, "get_container", || {
            client.get(container_id)
        })
        .await?;
        *state = self.policy.on_success(*state);
        debug!(container = %container.id, "calendar container reachable");
        Ok(())
    }

    /// Resolve one entity and persist its mapping before returning.
    async fn sync_item(&self, entity: &SchedulableEntity, state: &mut BackoffState) -> SyncOutcome {
        let resolution = match self
            .resolver
            .resolve_with_backoff(entity, &self.policy, state)
            .await
        {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(entity_id = %entity.id, error = %err, "entity failed to sync");
                return SyncOutcome::Failed(err.to_string());
            }
        };

        match self
            .sink
            .set_remote_id(&entity.id, &resolution.remote_id)
            .await
        {
            Ok(()) => resolution.outcome,
            Err(err) => {
                warn!(
                    entity_id = %entity.id,
                    remote_id = %resolution.remote_id,
                    error = %err,
                    "remote mutation succeeded but the mapping was not saved"
                );
                SyncOutcome::Failed(format!(
                    "remote event {} not recorded locally: {err}",
                    resolution.remote_id
                ))
            }
        }
    }
}
