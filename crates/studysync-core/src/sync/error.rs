//! Error classification shared by the remote client, the resolver and the
//! retry loop.
//!
//! Every failure that crosses the [`RemoteCalendarClient`] or
//! [`PersistenceSink`] seam is a [`SyncError`]; the engine only ever branches
//! on its [`ErrorClass`].
//!
//! [`RemoteCalendarClient`]: crate::sync::RemoteCalendarClient
//! [`PersistenceSink`]: crate::sync::PersistenceSink

use std::fmt;
use std::time::Duration;

use crate::error::ValidationError;

/// The four-way taxonomy the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The remote object (or container) does not exist. Triggers self-healing.
    NotFound,
    /// The remote service asked us to slow down. Retried under backoff.
    RateLimited,
    /// Network failure or 5xx. Retried under backoff with the same budget.
    Transient,
    /// Anything else. Never retried.
    Permanent,
}

impl ErrorClass {
    /// Whether the backoff controller should be consulted for this class.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::RateLimited | ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::NotFound => "not_found",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
        };
        f.write_str(s)
    }
}

/// Sync error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Remote resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Rate limited by calendar service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient calendar error: {0}")]
    Transient(String),

    #[error("Calendar API error: {0}")]
    Permanent(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Persistence error: {0}")]
    Storage(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A sync job for user '{user}' is already running")]
    JobInProgress { user: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SyncError> },
}

impl SyncError {
    /// Map this error onto the engine's taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::NotFound { .. } => ErrorClass::NotFound,
            SyncError::RateLimited { .. } => ErrorClass::RateLimited,
            SyncError::Transient(_) => ErrorClass::Transient,
            SyncError::Permanent(_)
            | SyncError::Unauthorized(_)
            | SyncError::Storage(_)
            | SyncError::Validation(_)
            | SyncError::JobInProgress { .. }
            | SyncError::RetriesExhausted { .. } => ErrorClass::Permanent,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        SyncError::NotFound {
            resource: resource.into(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return classify_status(status.as_u16(), None, None, &err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            SyncError::Transient(err.to_string())
        } else if err.is_decode() {
            SyncError::Permanent(format!("malformed response: {err}"))
        } else {
            SyncError::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Permanent(format!("serialization failed: {err}"))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

/// Classify an HTTP response status into a [`SyncError`].
///
/// `reason` is the first `error.errors[].reason` from a Google-style error
/// body; it distinguishes quota 403s from permission 403s.
pub fn classify_status(
    status: u16,
    reason: Option<&str>,
    retry_after: Option<Duration>,
    message: &str,
) -> SyncError {
    match status {
        404 | 410 => SyncError::not_found(message),
        429 => SyncError::RateLimited { retry_after },
        403 if matches!(reason, Some("rateLimitExceeded" | "userRateLimitExceeded")) => {
            SyncError::RateLimited { retry_after }
        }
        401 => SyncError::Unauthorized(message.to_string()),
        408 | 500..=599 => SyncError::Transient(format!("HTTP {status}: {message}")),
        _ => SyncError::Permanent(format!("HTTP {status}: {message}")),
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
///
/// HTTP-date values and zero are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_not_found_and_gone() {
        assert_eq!(classify_status(404, None, None, "x").class(), ErrorClass::NotFound);
        assert_eq!(classify_status(410, None, None, "x").class(), ErrorClass::NotFound);
    }

    #[test]
    fn classify_rate_limits() {
        let err = classify_status(429, None, Some(Duration::from_secs(3)), "slow down");
        assert_eq!(err.class(), ErrorClass::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));

        let quota = classify_status(403, Some("userRateLimitExceeded"), None, "quota");
        assert_eq!(quota.class(), ErrorClass::RateLimited);
    }

    #[test]
    fn forbidden_without_quota_reason_is_permanent() {
        let err = classify_status(403, Some("forbidden"), None, "no access");
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[test]
    fn classify_server_errors_as_transient() {
        for status in [408, 500, 502, 503, 504] {
            assert_eq!(
                classify_status(status, None, None, "boom").class(),
                ErrorClass::Transient,
                "status {status}"
            );
        }
    }

    #[test]
    fn unauthorized_and_validation_are_permanent() {
        assert_eq!(classify_status(401, None, None, "expired").class(), ErrorClass::Permanent);
        assert_eq!(classify_status(400, None, None, "bad").class(), ErrorClass::Permanent);
        assert_eq!(SyncError::Storage("disk".into()).class(), ErrorClass::Permanent);
    }

    #[test]
    fn retryable_classes() {
        assert!(ErrorClass::RateLimited.is_retryable());
        assert!(ErrorClass::Transient.is_retryable());
        assert!(!ErrorClass::NotFound.is_retryable());
        assert!(!ErrorClass::Permanent.is_retryable());
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 2 "), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("0"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
