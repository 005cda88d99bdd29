//! # StudySync Core Library
//!
//! Keeps a student's locally-owned schedule (class sessions, study blocks,
//! pinned tasks) mirrored into an external calendar. The CLI binary is a thin
//! layer over this crate.
//!
//! ## Architecture
//!
//! - **Sync**: Idempotent create-or-update resolver, batch orchestrator and
//!   on-demand path, all driven by one exponential backoff controller
//! - **Google adapter**: `reqwest` client for the Google Calendar v3 API
//! - **Storage**: SQLite entity store and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`Resolver`]: Reconciles one entity with the remote calendar
//! - [`SyncEngine`]: Chunked, throttled batch runs with per-item fault isolation
//! - [`OnDemandSync`]: Single-entity sync with a tighter retry budget
//! - [`BackoffPolicy`]: Pure retry/delay state machine
//! - [`EntityDb`]: Entity persistence and remote-id mapping
//! - [`Config`]: Application configuration management

pub mod error;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use storage::{Config, EntityDb};
pub use sync::{
    BackoffPolicy, ErrorClass, GoogleCalendarClient, OnDemandSync, RemoteCalendarClient,
    Resolver, SchedulableEntity, SyncEngine, SyncError, SyncOutcome, SyncResult,
};
