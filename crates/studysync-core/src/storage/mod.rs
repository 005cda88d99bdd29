mod config;
pub mod entity_db;
pub mod migrations;

pub use config::{BackoffConfig, Config, GoogleConfig, SyncConfig, MAX_DEDUP_WINDOW_SECS};
pub use entity_db::EntityDb;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the StudySync data directory, creating it if needed.
///
/// `STUDYSYNC_DATA_DIR` wins when set; otherwise `~/.config/studysync[-dev]/`
/// based on `STUDYSYNC_ENV` (set `STUDYSYNC_ENV=dev` for a development
/// directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STUDYSYNC_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("STUDYSYNC_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("studysync-dev")
            } else {
                base_dir.join("studysync")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
