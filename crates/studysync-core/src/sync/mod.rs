//! External calendar reconciliation.
//!
//! Keeps locally-owned schedulable entities (class sessions, study blocks,
//! pinned tasks) mirrored as events in one remote calendar per user. The
//! remote side is unreliable and rate-limited, so every entity is resolved
//! through an idempotent create-or-update ([`Resolver`]) and the resulting
//! remote id is persisted before the next entity is touched.

pub mod backoff;
pub mod calendar_client;
pub mod error;
pub mod event_codec;
pub mod google_client;
pub mod lock;
pub mod on_demand;
pub mod resolver;
pub mod sink;
pub mod sync_engine;
pub mod types;


pub use backoff::{BackoffAction, BackoffPolicy, BackoffState};
pub use calendar_client::{EnvTokenStore, RemoteCalendarClient, StaticTokenStore, TokenStore};
pub use error::{classify_status, ErrorClass, SyncError};
pub use event_codec::PayloadOptions;
pub use google_client::GoogleCalendarClient;
pub use lock::SyncLock;
pub use on_demand::OnDemandSync;
pub use resolver::{Resolution, ResolveStep, Resolver, DEFAULT_DEDUP_WINDOW};
pub use sink::{EntitySource, PersistenceSink};
pub use sync_engine::{SyncEngine, DEFAULT_CHUNK_SIZE};
pub use types::{
    Backlink, EventPayload, RemoteContainer, RemoteEvent, SchedulableEntity, SyncFailure,
    SyncOutcome, SyncResult,
};
