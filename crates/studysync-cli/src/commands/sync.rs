//! Calendar sync commands.
//!
//! `sync all` runs a locked batch job over every eligible entity; `sync one`
//! pushes a single entity with the on-demand retry budget.

use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use studysync_core::storage::data_dir;
use studysync_core::sync::{EnvTokenStore, OnDemandSync, Resolver, SyncEngine};
use studysync_core::{Config, EntityDb, GoogleCalendarClient};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Sync every eligible entity
    All {
        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync a single entity and print its remote event id
    One {
        /// Entity ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: SyncAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(EntityDb::open_default()?);
    let resolver = build_resolver(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match action {
            SyncAction::All { json } => {
                let engine = SyncEngine::new(resolver, db.clone())
                    .with_policy(config.sync.batch.policy())
                    .with_chunk_size(config.sync.chunk_size);
                let result = engine
                    .run_job(db.as_ref(), &data_dir()?, &config.sync.user_id)
                    .await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    println!(
                        "Synced {} entities ({} created, {} updated)",
                        result.synced(),
                        result.created,
                        result.updated
                    );
                    for failure in &result.errors {
                        println!("  failed {}: {}", failure.entity_id, failure.message);
                    }
                }

                if !result.is_clean() {
                    return Err(format!("{} entities failed to sync", result.errors.len()).into());
                }
            }
            SyncAction::One { id, json } => {
                let entity = db
                    .get_entity(&id)?
                    .ok_or_else(|| format!("entity not found: {id}"))?;
                let on_demand = OnDemandSync::new(resolver, db.clone())
                    .with_policy(config.sync.on_demand.policy());
                let remote_id = on_demand.sync_one(&entity).await?;

                if json {
                    let out = serde_json::json!({ "entity_id": id, "remote_event_id": remote_id });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                } else {
                    println!("{id} -> {remote_id}");
                }
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn build_resolver(config: &Config) -> Result<Resolver, Box<dyn std::error::Error>> {
    let tokens = Arc::new(EnvTokenStore::new(config.google.token_env_var.clone()));
    let client = GoogleCalendarClient::with_base_url(
        &config.google.api_base_url,
        tokens,
        Duration::from_secs(config.google.request_timeout_secs),
    )?;

    Ok(Resolver::new(Arc::new(client), config.sync.calendar_id.clone())
        .with_payload_options(config.sync.payload_options()?)
        .with_dedup_window(config.sync.dedup_window()))
}
