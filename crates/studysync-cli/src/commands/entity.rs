//! Entity management commands for CLI.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use studysync_core::{EntityDb, SchedulableEntity};
use uuid::Uuid;

#[derive(Subcommand)]
pub enum EntityAction {
    /// Add or replace a schedulable entity
    Add {
        /// Title shown on the calendar event
        title: String,
        /// Start instant (RFC 3339, e.g. 2025-03-10T09:00:00Z)
        #[arg(long)]
        start: DateTime<Utc>,
        /// End instant (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,
        /// Entity ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    /// List entities
    List {
        /// Only entities included in batch sync
        #[arg(long)]
        eligible: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Include or exclude an entity from batch sync
    SetEligible {
        /// Entity ID
        id: String,
        /// true or false
        #[arg(action = clap::ArgAction::Set)]
        eligible: bool,
    },
    /// Delete an entity
    Remove {
        /// Entity ID
        id: String,
    },
}

pub fn run(action: EntityAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = EntityDb::open_default()?;

    match action {
        EntityAction::Add {
            title,
            start,
            end,
            id,
            description,
            location,
        } => {
            let mut entity = SchedulableEntity::new(
                id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                title,
                start,
                end,
            );
            entity.description = description;
            entity.location = location;
            entity.validate()?;
            db.upsert_entity(&entity)?;
            println!("Entity saved: {}", entity.id);
        }
        EntityAction::List { eligible, json } => {
            let entities = if eligible {
                db.list_eligible()?
            } else {
                db.list_entities()?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&entities)?);
            } else if entities.is_empty() {
                println!("No entities");
            } else {
                for entity in &entities {
                    println!(
                        "{}  {}  {} -> {}  [{}]",
                        entity.id,
                        entity.title,
                        entity.start_time.to_rfc3339(),
                        entity.end_time.to_rfc3339(),
                        entity.remote_event_id.as_deref().unwrap_or("not synced"),
                    );
                }
            }
        }
        EntityAction::SetEligible { id, eligible } => {
            db.set_sync_eligible(&id, eligible)?;
            println!("ok");
        }
        EntityAction::Remove { id } => {
            if db.delete_entity(&id)? {
                println!("Entity removed: {id}");
            } else {
                return Err(format!("entity not found: {id}").into());
            }
        }
    }
    Ok(())
}
