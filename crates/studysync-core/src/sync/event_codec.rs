//! Encoding between schedulable entities, provider-neutral payloads and
//! Google Calendar JSON.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;

use super::error::SyncError;
use super::types::{Backlink, EventPayload, RemoteContainer, RemoteEvent, SchedulableEntity};

/// Key under `extendedProperties.private` holding the local entity id.
pub const ENTITY_ID_PROPERTY: &str = "studysync_entity_id";

/// Fixed, per-user settings applied to every outgoing payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadOptions {
    pub time_zone: Tz,
    pub category_marker: String,
    pub backlink_title: String,
    pub backlink_base_url: String,
}

impl Default for PayloadOptions {
    fn default() -> Self {
        Self {
            time_zone: Tz::UTC,
            category_marker: "9".to_string(),
            backlink_title: "StudySync".to_string(),
            backlink_base_url: "https://studysync.app/schedule".to_string(),
        }
    }
}

/// Build the payload sent on insert/update for `entity`.
pub fn entity_to_payload(entity: &SchedulableEntity, options: &PayloadOptions) -> EventPayload {
    let tz = options.time_zone;
    EventPayload {
        entity_id: entity.id.clone(),
        summary: entity.title.clone(),
        description: entity.description.clone(),
        location: entity.location.clone(),
        start: entity.start_time.with_timezone(&tz).to_rfc3339(),
        end: entity.end_time.with_timezone(&tz).to_rfc3339(),
        time_zone: tz.name().to_string(),
        category: options.category_marker.clone(),
        source: Backlink {
            title: options.backlink_title.clone(),
            url: format!(
                "{}/{}",
                options.backlink_base_url.trim_end_matches('/'),
                urlencoding::encode(&entity.id)
            ),
        },
    }
}

/// Convert a payload into a Google Calendar event resource.
pub fn payload_to_gcal_json(payload: &EventPayload) -> serde_json::Value {
    let mut event = json!({
        "summary": payload.summary,
        "start": {
            "dateTime": payload.start,
            "timeZone": payload.time_zone,
        },
        "end": {
            "dateTime": payload.end,
            "timeZone": payload.time_zone,
        },
        "colorId": payload.category,
        "source": {
            "title": payload.source.title,
            "url": payload.source.url,
        },
        "extendedProperties": {
            "private": {
                ENTITY_ID_PROPERTY: payload.entity_id,
            }
        }
    });

    // Explicit nulls would clear fields set by the user in the calendar UI.
    if let Some(description) = &payload.description {
        event["description"] = json!(description);
    }
    if let Some(location) = &payload.location {
        event["location"] = json!(location);
    }

    event
}

/// Parse a Google Calendar event resource.
///
/// Only the id is required; summary and start are kept for dedup matching.
pub fn parse_gcal_event(event_json: &serde_json::Value) -> Result<RemoteEvent, SyncError> {
    let id = event_json["id"]
        .as_str()
        .ok_or_else(|| SyncError::Permanent("event resource missing id".into()))?;

    let start = event_json["start"]["dateTime"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(RemoteEvent {
        id: id.to_string(),
        summary: event_json["summary"].as_str().map(str::to_string),
        start,
    })
}

/// Parse a Google Calendar calendar resource.
pub fn parse_gcal_calendar(calendar_json: &serde_json::Value) -> Result<RemoteContainer, SyncError> {
    let id = calendar_json["id"]
        .as_str()
        .ok_or_else(|| SyncError::Permanent("calendar resource missing id".into()))?;

    Ok(RemoteContainer {
        id: id.to_string(),
        summary: calendar_json["summary"].as_str().map(str::to_string),
        time_zone: calendar_json["timeZone"].as_str().map(str::to_string),
    })
}

/// Parse the `items` of an events list response, skipping cancelled events.
pub fn parse_gcal_event_list(list_json: &serde_json::Value) -> Result<Vec<RemoteEvent>, SyncError> {
    let Some(items) = list_json["items"].as_array() else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .filter(|item| item["status"].as_str() != Some("cancelled"))
        .map(parse_gcal_event)
        .collect()
}
