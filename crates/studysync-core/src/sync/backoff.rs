//! Retry pacing for calls against the remote calendar.
//!
//! The controller is a pure function of `(policy, state, error class)`, so the
//! retry policy can be tested without any remote calls or sleeping. One
//! [`BackoffState`] belongs to exactly one sync job.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ErrorClass;

/// What the retry loop should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffAction {
    /// Sleep for `delay`, then repeat the same step.
    Retry { delay: Duration },
    /// Stop retrying this item.
    GiveUp,
}

/// Mutable pacing state for a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    pub current_delay: Duration,
    pub retry_count: u32,
}

/// Limits for one code path (batch or on-demand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    /// Throughput-oriented preset for bulk runs.
    pub const fn batch() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            max_retries: 5,
        }
    }

    /// Latency-oriented preset for a single caller waiting on one entity.
    pub const fn on_demand() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Fresh state for a new job.
    pub fn initial_state(&self) -> BackoffState {
        BackoffState {
            current_delay: self.initial_delay,
            retry_count: 0,
        }
    }

    /// Decide whether to retry after an error of class `class`.
    ///
    /// Rate-limited and transient errors double the delay up to `max_delay`
    /// and consume one retry; `GiveUp` once `retry_count` reaches
    /// `max_retries`. Other classes are never retried and leave the state
    /// untouched.
    pub fn next_delay(&self, state: BackoffState, class: ErrorClass) -> (BackoffState, BackoffAction) {
        if !class.is_retryable() {
            return (state, BackoffAction::GiveUp);
        }

        let next = BackoffState {
            current_delay: state.current_delay.saturating_mul(2).min(self.max_delay),
            retry_count: state.retry_count.saturating_add(1),
        };

        if next.retry_count >= self.max_retries {
            (next, BackoffAction::GiveUp)
        } else {
            (
                next,
                BackoffAction::Retry {
                    delay: next.current_delay,
                },
            )
        }
    }

    /// State after a successful item: delay and retry count both reset.
    pub fn on_success(&self, _state: BackoffState) -> BackoffState {
        self.initial_state()
    }

    /// State at the start of a new item. The retry budget is per item; the
    /// delay carries over so the inter-chunk throttle reflects recent
    /// pressure from the remote service.
    pub fn begin_item(&self, state: BackoffState) -> BackoffState {
        BackoffState {
            current_delay: state.current_delay,
            retry_count: 0,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::batch()
    }
}
