//! Create-vs-update-vs-attach decision for one entity.
//!
//! Resolution is a small state machine:
//!
//! ```text
//! stored id?  ── yes ──> UpdateStored ──ok──> Updated
//!     │                      │ NotFound (deleted remotely)
//!     no                     v
//!     └────────────────> Search ──match──> UpdateMatch ──ok──> Updated
//!                            │                 │ NotFound
//!                            no match          v
//!                            └────────────> Create ──ok──> Created
//! ```
//!
//! A rate-limited or transient failure repeats the *same* step after the
//! delay chosen by the [`BackoffPolicy`]; the caller persists the returned
//! remote id.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::backoff::{BackoffAction, BackoffPolicy, BackoffState};
use super::calendar_client::RemoteCalendarClient;
use super::error::SyncError;
use super::event_codec::{entity_to_payload, PayloadOptions};
use super::types::{EventPayload, RemoteEvent, SchedulableEntity, SyncOutcome};

/// Default half-width of the dedup search window.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// A step of the per-entity state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveStep {
    /// Update the event referenced by the entity's stored id.
    UpdateStored(String),
    /// Look for an existing event by title around the start time.
    Search,
    /// Update the event found by the search and adopt it.
    UpdateMatch(String),
    /// Insert a new event.
    Create,
}

/// Terminal success of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub remote_id: String,
    /// `Created` or `Updated`.
    pub outcome: SyncOutcome,
}

enum StepResult {
    Next(ResolveStep),
    Done(Resolution),
}

/// Resolves entities against one remote calendar container.
pub struct Resolver {
    client: Arc<dyn RemoteCalendarClient>,
    container_id: String,
    options: PayloadOptions,
    dedup_window: Duration,
}

impl Resolver {
    pub fn new(client: Arc<dyn RemoteCalendarClient>, container_id: impl Into<String>) -> Self {
        Self {
            client,
            container_id: container_id.into(),
            options: PayloadOptions::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    pub fn with_payload_options(mut self, options: PayloadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn client(&self) -> &Arc<dyn RemoteCalendarClient> {
        &self.client
    }

    /// First step for `entity`.
    pub fn initial_step(entity: &SchedulableEntity) -> ResolveStep {
        match &entity.remote_event_id {
            Some(id) if !id.is_empty() => ResolveStep::UpdateStored(id.clone()),
            _ => ResolveStep::Search,
        }
    }

    /// Resolve `entity` in a single pass, without retrying.
    pub async fn resolve(&self, entity: &SchedulableEntity) -> Result<Resolution, SyncError> {
        entity.validate()?;
        let payload = entity_to_payload(entity, &self.options);
        let mut step = Self::initial_step(entity);

        loop {
            match self.run_step(&step, entity, &payload).await? {
                StepResult::Next(next) => step = next,
                StepResult::Done(resolution) => return Ok(resolution),
            }
        }
    }

    /// Resolve `entity`, retrying rate-limited and transient failures of the
    /// current step under `policy`.
    ///
    /// `state` is the job's backoff state; it is reset on success and left
    /// elevated on failure.
    #[tracing::instrument(skip_all, fields(entity_id = %entity.id))]
    pub async fn resolve_with_backoff(
        &self,
        entity: &SchedulableEntity,
        policy: &BackoffPolicy,
        state: &mut BackoffState,
    ) -> Result<Resolution, SyncError> {
        entity.validate()?;
        *state = policy.begin_item(*state);

        let payload = entity_to_payload(entity, &self.options);
        let mut step = Self::initial_step(entity);

        loop {
            let result = with_backoff(policy, state, &format!("{step:?}"), || {
                self.run_step(&step, entity, &payload)
            })
            .await?;
            match result {
                StepResult::Next(next) => step = next,
                StepResult::Done(resolution) => {
                    *state = policy.on_success(*state);
                    return Ok(resolution);
                }
            }
        }
    }

    async fn run_step(
        &self,
        step: &ResolveStep,
        entity: &SchedulableEntity,
        payload: &EventPayload,
    ) -> Result<StepResult, SyncError> {
        match step {
            ResolveStep::UpdateStored(remote_id) => {
                match self.client.update(&self.container_id, remote_id, payload).await {
                    Ok(event) => Ok(StepResult::Done(Resolution {
                        remote_id: event.id,
                        outcome: SyncOutcome::Updated,
                    })),
                    Err(SyncError::NotFound { .. }) => {
                        info!(%remote_id, "stored remote event is gone, searching for a replacement");
                        Ok(StepResult::Next(ResolveStep::Search))
                    }
                    Err(err) => Err(err),
                }
            }
            ResolveStep::Search => {
                let (time_min, time_max) = self.dedup_range(entity.start_time);
                let candidates = self
                    .client
                    .search(&self.container_id, time_min, time_max, &entity.title)
                    .await?;
                match self.pick_match(entity, &candidates) {
                    Some(found) => {
                        debug!(
                            remote_id = %found.id,
                            candidates = candidates.len(),
                            "attaching to existing remote event"
                        );
                        Ok(StepResult::Next(ResolveStep::UpdateMatch(found.id.clone())))
                    }
                    None => Ok(StepResult::Next(ResolveStep::Create)),
                }
            }
            ResolveStep::UpdateMatch(remote_id) => {
                match self.client.update(&self.container_id, remote_id, payload).await {
                    Ok(event) => Ok(StepResult::Done(Resolution {
                        remote_id: event.id,
                        outcome: SyncOutcome::Updated,
                    })),
                    Err(SyncError::NotFound { .. }) => Ok(StepResult::Next(ResolveStep::Create)),
                    Err(err) => Err(err),
                }
            }
            ResolveStep::Create => {
                let event = self.client.insert(&self.container_id, payload).await?;
                Ok(StepResult::Done(Resolution {
                    remote_id: event.id,
                    outcome: SyncOutcome::Created,
                }))
            }
        }
    }

    /// `[start - window, start + window]`, clamped to the representable range.
    fn dedup_range(&self, start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let window = TimeDelta::from_std(self.dedup_window).unwrap_or(TimeDelta::MAX);
        (
            start
                .checked_sub_signed(window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            start
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// First candidate whose title matches exactly and whose start falls in
    /// the dedup window. Ties keep the provider's ordering.
    fn pick_match<'a>(
        &self,
        entity: &SchedulableEntity,
        candidates: &'a [RemoteEvent],
    ) -> Option<&'a RemoteEvent> {
        let (time_min, time_max) = self.dedup_range(entity.start_time);
        candidates.iter().find(|event| {
            event.summary.as_deref() == Some(entity.title.as_str())
                && event
                    .start
                    .is_some_and(|start| start >= time_min && start <= time_max)
        })
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy gives up. Each failure of a retryable class sleeps for the delay the
/// policy picks (stretched to a server `Retry-After` hint, within
/// `max_delay`) before repeating the same call.
pub(crate) async fn with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    state: &mut BackoffState,
    operation: &str,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let class = err.class();
        if !class.is_retryable() {
            return Err(err);
        }

        let (next_state, action) = policy.next_delay(*state, class);
        *state = next_state;
        match action {
            BackoffAction::Retry { delay } => {
                let delay = match err.retry_after() {
                    Some(hint) => delay.max(hint).min(policy.max_delay),
                    None => delay,
                };
                warn!(
                    operation,
                    %class,
                    retry_count = state.retry_count,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "remote call failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            BackoffAction::GiveUp => {
                warn!(operation, %class, attempts = state.retry_count, "giving up");
                return Err(SyncError::RetriesExhausted {
                    attempts: state.retry_count,
                    last: Box::new(err),
                });
            }
        }
    }
}
