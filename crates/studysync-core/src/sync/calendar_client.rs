//! Capability interfaces for the external calendar.
//!
//! The engine talks to any calendar provider through
//! [`RemoteCalendarClient`]. Provider adapters (see
//! [`GoogleCalendarClient`](super::google_client::GoogleCalendarClient))
//! translate these four calls into the provider's API and classify failures
//! into [`SyncError`].

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::SyncError;
use super::types::{EventPayload, RemoteContainer, RemoteEvent};

/// The operations the reconciliation engine needs from a calendar provider.
///
/// Every call is scoped to one container (one user's calendar).
#[async_trait]
pub trait RemoteCalendarClient: Send + Sync {
    /// Fetch the container, or `NotFound`.
    async fn get(&self, container_id: &str) -> Result<RemoteContainer, SyncError>;

    /// Events overlapping `[time_min, time_max)` that match `query` as free text.
    async fn search(
        &self,
        container_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        query: &str,
    ) -> Result<Vec<RemoteEvent>, SyncError>;

    async fn insert(
        &self,
        container_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError>;

    /// Replace the event's fields, or `NotFound` if it no longer exists.
    async fn update(
        &self,
        container_id: &str,
        remote_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError>;
}

/// Source of access tokens for a provider adapter.
///
/// Owned by the auth layer. Adapters call it per request; the engine never
/// sees it.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// A currently valid access token.
    async fn access_token(&self) -> Result<String, SyncError>;

    /// Drop any cached token so the next `access_token` call fetches or
    /// refreshes one. Called by adapters after a 401.
    async fn invalidate(&self) {}
}

/// A fixed token, for tests and short-lived scripts.
pub struct StaticTokenStore {
    token: String,
}

impl StaticTokenStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenStore for StaticTokenStore {
    async fn access_token(&self) -> Result<String, SyncError> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable, caching it until
/// invalidated. An external helper is expected to keep the variable fresh.
pub struct EnvTokenStore {
    var: String,
    cached: Mutex<Option<String>>,
}

impl EnvTokenStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenStore for EnvTokenStore {
    async fn access_token(&self) -> Result<String, SyncError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| SyncError::Storage("token cache poisoned".into()))?;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = std::env::var(&self.var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SyncError::Unauthorized(format!("{} is not set", self.var)))?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_store_returns_token() {
        let store = StaticTokenStore::new("abc");
        assert_eq!(store.access_token().await.unwrap(), "abc");
        store.invalidate().await;
        assert_eq!(store.access_token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn env_store_missing_variable_is_unauthorized() {
        let store = EnvTokenStore::new("STUDYSYNC_TEST_TOKEN_THAT_IS_NEVER_SET");
        let err = store.access_token().await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized(_)));
    }
}
