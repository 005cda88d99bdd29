//! Shared fakes for the sync integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::time::Instant;

use studysync_core::sync::{
    EventPayload, PersistenceSink, RemoteCalendarClient, RemoteContainer, RemoteEvent,
    SchedulableEntity, SyncError,
};

pub const CALENDAR: &str = "primary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Search,
    Insert,
    Update,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    /// Entity id for insert/update, query for search, container for get.
    pub subject: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub entity_id: Option<String>,
}

#[derive(Default)]
struct State {
    events: BTreeMap<String, StoredEvent>,
    next_id: u32,
    missing_container: bool,
    scripted: HashMap<Op, VecDeque<SyncError>>,
    poisoned_titles: HashMap<String, SyncError>,
    calls: Vec<Call>,
}

/// In-memory calendar with scripted failures and a timestamped call log.
#[derive(Default)]
pub struct FakeCalendar {
    state: Mutex<State>,
}

impl FakeCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `err` as the result of the next `op` call.
    pub fn fail_next(&self, op: Op, err: SyncError) {
        let mut state = self.state.lock().unwrap();
        state.scripted.entry(op).or_default().push_back(err);
    }

    /// Every insert/update carrying `title` fails with `err`.
    pub fn poison_title(&self, title: &str, err: SyncError) {
        let mut state = self.state.lock().unwrap();
        state.poisoned_titles.insert(title.to_string(), err);
    }

    pub fn remove_container(&self) {
        self.state.lock().unwrap().missing_container = true;
    }

    pub fn seed_event(&self, id: &str, summary: &str, start: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.events.insert(
            id.to_string(),
            StoredEvent {
                summary: summary.to_string(),
                start,
                entity_id: None,
            },
        );
    }

    pub fn delete_event(&self, id: &str) {
        self.state.lock().unwrap().events.remove(id);
    }

    pub fn event(&self, id: &str) -> Option<StoredEvent> {
        self.state.lock().unwrap().events.get(id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    fn begin(&self, op: Op, subject: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            op,
            subject: subject.to_string(),
            at: Instant::now(),
        });
        match state.scripted.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_poison(&self, payload: &EventPayload) -> Result<(), SyncError> {
        let state = self.state.lock().unwrap();
        match state.poisoned_titles.get(&payload.summary) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn payload_start(payload: &EventPayload) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&payload.start)
        .unwrap()
        .with_timezone(&Utc)
}

fn to_remote(id: &str, event: &StoredEvent) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        summary: Some(event.summary.clone()),
        start: Some(event.start),
    }
}

#[async_trait]
impl RemoteCalendarClient for FakeCalendar {
    async fn get(&self, container_id: &str) -> Result<RemoteContainer, SyncError> {
        self.begin(Op::Get, container_id)?;
        if self.state.lock().unwrap().missing_container {
            return Err(SyncError::not_found(format!("calendar {container_id}")));
        }
        Ok(RemoteContainer {
            id: container_id.to_string(),
            summary: Some("Study".into()),
            time_zone: Some("UTC".into()),
        })
    }

    async fn search(
        &self,
        _container_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        query: &str,
    ) -> Result<Vec<RemoteEvent>, SyncError> {
        self.begin(Op::Search, query)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .iter()
            .filter(|(_, e)| e.summary.contains(query) && e.start >= time_min && e.start < time_max)
            .map(|(id, e)| to_remote(id, e))
            .collect())
    }

    async fn insert(
        &self,
        _container_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError> {
        self.begin(Op::Insert, &payload.entity_id)?;
        self.check_poison(payload)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("evt-{}", state.next_id);
        let event = StoredEvent {
            summary: payload.summary.clone(),
            start: payload_start(payload),
            entity_id: Some(payload.entity_id.clone()),
        };
        let remote = to_remote(&id, &event);
        state.events.insert(id, event);
        Ok(remote)
    }

    async fn update(
        &self,
        _container_id: &str,
        remote_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError> {
        self.begin(Op::Update, &payload.entity_id)?;
        self.check_poison(payload)?;
        let mut state = self.state.lock().unwrap();
        let event = state
            .events
            .get_mut(remote_id)
            .ok_or_else(|| SyncError::not_found(format!("event {remote_id}")))?;
        event.summary = payload.summary.clone();
        event.start = payload_start(payload);
        event.entity_id = Some(payload.entity_id.clone());
        Ok(to_remote(remote_id, event))
    }
}

/// Sink that records every write and can be told to fail.
#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn remote_id_for(&self, entity_id: &str) -> Option<String> {
        self.writes()
            .into_iter()
            .rev()
            .find(|(e, _)| e == entity_id)
            .map(|(_, r)| r)
    }

    /// Apply recorded ids to `entities`, as a real store would on reload.
    pub fn apply(&self, entities: &mut [SchedulableEntity]) {
        for entity in entities {
            if let Some(remote) = self.remote_id_for(&entity.id) {
                entity.remote_event_id = Some(remote);
            }
        }
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn set_remote_id(&self, entity_id: &str, remote_id: &str) -> Result<(), SyncError> {
        if *self.failing.lock().unwrap() {
            return Err(SyncError::Storage("disk full".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((entity_id.to_string(), remote_id.to_string()));
        Ok(())
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
}

/// `count` one-hour entities with distinct titles, an hour apart.
pub fn entities(count: usize) -> Vec<SchedulableEntity> {
    (0..count)
        .map(|i| {
            let start = base_time() + Duration::hours(i as i64);
            SchedulableEntity::new(
                format!("entity-{i}"),
                format!("Study block {i}"),
                start,
                start + Duration::hours(1),
            )
        })
        .collect()
}
