//! Google Calendar v3 adapter for [`RemoteCalendarClient`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use super::calendar_client::{RemoteCalendarClient, TokenStore};
use super::error::{classify_status, parse_retry_after, SyncError};
use super::event_codec::{
    parse_gcal_calendar, parse_gcal_event, parse_gcal_event_list, payload_to_gcal_json,
};
use super::types::{EventPayload, RemoteContainer, RemoteEvent};

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar API client.
pub struct GoogleCalendarClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl GoogleCalendarClient {
    /// Client against the public Google endpoint.
    pub fn new(tokens: Arc<dyn TokenStore>) -> Result<Self, SyncError> {
        Self::with_base_url(DEFAULT_API_BASE_URL, tokens, Duration::from_secs(30))
    }

    /// Client against an arbitrary base URL (proxies, test servers).
    pub fn with_base_url(
        base_url: &str,
        tokens: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| SyncError::Permanent(format!("invalid API base URL '{base_url}': {e}")))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Permanent(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn calendar_url(&self, container_id: &str) -> String {
        format!(
            "{}/calendars/{}",
            self.base_url,
            urlencoding::encode(container_id)
        )
    }

    fn events_url(&self, container_id: &str) -> String {
        format!("{}/events", self.calendar_url(container_id))
    }

    fn event_url(&self, container_id: &str, remote_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(container_id),
            urlencoding::encode(remote_id)
        )
    }

    /// Send an authenticated request and decode the JSON body.
    ///
    /// A 401 invalidates the cached token and replays the request once.
    async fn send_json<F>(&self, build: F) -> Result<serde_json::Value, SyncError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.tokens.access_token().await?;
        let response = build(&self.http).bearer_auth(&token).send().await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("access token rejected, refreshing once");
            self.tokens.invalidate().await;
            let token = self.tokens.access_token().await?;
            build(&self.http).bearer_auth(&token).send().await?
        } else {
            response
        };

        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        Err(error_from_response(response).await)
    }
}

/// Turn a non-success response into a classified error.
async fn error_from_response(response: Response) -> SyncError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let reason = body["error"]["errors"][0]["reason"].as_str();
    let message = body["error"]["message"]
        .as_str()
        .unwrap_or("no error message");

    classify_status(status, reason, retry_after, message)
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl RemoteCalendarClient for GoogleCalendarClient {
    async fn get(&self, container_id: &str) -> Result<RemoteContainer, SyncError> {
        let url = self.calendar_url(container_id);
        let body = self.send_json(|http| http.get(&url)).await?;
        parse_gcal_calendar(&body)
    }

    async fn search(
        &self,
        container_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        query: &str,
    ) -> Result<Vec<RemoteEvent>, SyncError> {
        let url = self.events_url(container_id);
        let params = [
            ("timeMin", rfc3339(time_min)),
            ("timeMax", rfc3339(time_max)),
            ("q", query.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        let body = self.send_json(|http| http.get(&url).query(&params)).await?;
        parse_gcal_event_list(&body)
    }

    async fn insert(
        &self,
        container_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError> {
        let url = self.events_url(container_id);
        let event = payload_to_gcal_json(payload);
        let body = self.send_json(|http| http.post(&url).json(&event)).await?;
        parse_gcal_event(&body)
    }

    async fn update(
        &self,
        container_id: &str,
        remote_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError> {
        let url = self.event_url(container_id, remote_id);
        let event = payload_to_gcal_json(payload);
        let body = self.send_json(|http| http.put(&url).json(&event)).await?;
        parse_gcal_event(&body)
    }
}
