//! TOML-based application configuration.
//!
//! Stores the calendar sync settings:
//! - Which user and remote calendar a job targets
//! - Local time zone and payload decorations (category marker, back-link)
//! - Chunk size, dedup window and the two backoff presets
//! - Google Calendar endpoint and token source
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::sync::google_client::DEFAULT_API_BASE_URL;
use crate::sync::{BackoffPolicy, PayloadOptions};

/// Upper bound for `sync.dedup_window_secs` (one day).
pub const MAX_DEDUP_WINDOW_SECS: u64 = 86_400;

/// Backoff limits as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl BackoffConfig {
    fn from_policy(policy: BackoffPolicy) -> Self {
        Self {
            initial_delay_ms: u64::try_from(policy.initial_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX),
            max_retries: policy.max_retries,
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_retries: self.max_retries,
        }
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.initial_delay_ms == 0 {
            return Err(invalid(format!("{key}.initial_delay_ms"), "must be at least 1"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(invalid(
                format!("{key}.max_delay_ms"),
                "must not be smaller than initial_delay_ms",
            ));
        }
        if self.max_retries == 0 {
            return Err(invalid(format!("{key}.max_retries"), "must be at least 1"));
        }
        Ok(())
    }
}

/// Calendar sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Remote calendar (container) id.
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// IANA zone used to render event times.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Written as the event colour so synced items are recognisable.
    #[serde(default = "default_category_marker")]
    pub category_marker: String,
    #[serde(default = "default_backlink_title")]
    pub backlink_title: String,
    #[serde(default = "default_backlink_base_url")]
    pub backlink_base_url: String,
    #[serde(default = "default_batch_backoff")]
    pub batch: BackoffConfig,
    #[serde(default = "default_on_demand_backoff")]
    pub on_demand: BackoffConfig,
}

/// Google Calendar adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Environment variable holding the OAuth access token.
    #[serde(default = "default_token_env_var")]
    pub token_env_var: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub google: GoogleConfig,
}

// Default functions
fn default_user_id() -> String {
    "default".into()
}
fn default_calendar_id() -> String {
    "primary".into()
}
fn default_time_zone() -> String {
    "UTC".into()
}
fn default_chunk_size() -> usize {
    crate::sync::DEFAULT_CHUNK_SIZE
}
fn default_dedup_window_secs() -> u64 {
    crate::sync::DEFAULT_DEDUP_WINDOW.as_secs()
}
fn default_category_marker() -> String {
    "9".into()
}
fn default_backlink_title() -> String {
    "StudySync".into()
}
fn default_backlink_base_url() -> String {
    "https://studysync.app/schedule".into()
}
fn default_batch_backoff() -> BackoffConfig {
    BackoffConfig::from_policy(BackoffPolicy::batch())
}
fn default_on_demand_backoff() -> BackoffConfig {
    BackoffConfig::from_policy(BackoffPolicy::on_demand())
}
fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.into()
}
fn default_token_env_var() -> String {
    "STUDYSYNC_GOOGLE_TOKEN".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}

fn invalid(key: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            calendar_id: default_calendar_id(),
            time_zone: default_time_zone(),
            chunk_size: default_chunk_size(),
            dedup_window_secs: default_dedup_window_secs(),
            category_marker: default_category_marker(),
            backlink_title: default_backlink_title(),
            backlink_base_url: default_backlink_base_url(),
            batch: default_batch_backoff(),
            on_demand: default_on_demand_backoff(),
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_env_var: default_token_env_var(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| invalid("sync.time_zone", format!("unknown time zone '{}'", self.time_zone)))
    }

    pub fn payload_options(&self) -> Result<PayloadOptions, ConfigError> {
        Ok(PayloadOptions {
            time_zone: self.time_zone()?,
            category_marker: self.category_marker.clone(),
            backlink_title: self.backlink_title.clone(),
            backlink_base_url: self.backlink_base_url.clone(),
        })
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(key, format!("cannot parse '{value}' as bool")))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(key, format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(key, e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// validated, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Check the values the sync engine depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.chunk_size == 0 {
            return Err(invalid("sync.chunk_size", "must be at least 1"));
        }
        if self.sync.calendar_id.trim().is_empty() {
            return Err(invalid("sync.calendar_id", "must not be empty"));
        }
        if self.sync.dedup_window_secs > MAX_DEDUP_WINDOW_SECS {
            return Err(invalid(
                "sync.dedup_window_secs",
                format!("must not exceed {MAX_DEDUP_WINDOW_SECS}"),
            ));
        }
        self.sync.time_zone()?;
        self.sync.batch.validate("sync.batch")?;
        self.sync.on_demand.validate("sync.on_demand")?;
        url::Url::parse(&self.google.api_base_url)
            .map_err(|e| invalid("google.api_base_url", e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving. Returns error if the key is
    /// unknown or the resulting config is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(key, e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| invalid(key, e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sync.chunk_size, 10);
        assert_eq!(parsed.sync.dedup_window_secs, 60);
        assert_eq!(parsed.sync.batch, cfg.sync.batch);
    }

    #[test]
    fn default_backoff_matches_presets() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.batch.policy(), BackoffPolicy::batch());
        assert_eq!(cfg.sync.on_demand.policy(), BackoffPolicy::on_demand());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[sync]\ncalendar_id = \"study@group.calendar\"\n").unwrap();
        assert_eq!(cfg.sync.calendar_id, "study@group.calendar");
        assert_eq!(cfg.sync.time_zone, "UTC");
        assert_eq!(cfg.google.token_env_var, "STUDYSYNC_GOOGLE_TOKEN");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("sync.chunk_size").as_deref(), Some("10"));
        assert_eq!(cfg.get("sync.batch.max_retries").as_deref(), Some("5"));
        assert_eq!(cfg.get("sync.calendar_id").as_deref(), Some("primary"));
        assert!(cfg.get("sync.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_number_and_string() {
        let mut cfg = Config::default();
        cfg.set("sync.on_demand.max_retries", "4").unwrap();
        cfg.set("sync.time_zone", "America/New_York").unwrap();
        assert_eq!(cfg.sync.on_demand.max_retries, 4);
        assert_eq!(cfg.sync.time_zone().unwrap(), chrono_tz::America::New_York);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.set("sync.nonexistent_key", "value").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.set("sync.chunk_size", "ten").is_err());
        assert_eq!(cfg.sync.chunk_size, 10);
    }

    #[test]
    fn set_rejects_values_that_fail_validation() {
        let mut cfg = Config::default();
        assert!(cfg.set("sync.chunk_size", "0").is_err());
        assert!(cfg.set("sync.time_zone", "Mars/Olympus").is_err());
        assert!(cfg.set("sync.batch.max_delay_ms", "10").is_err());
        assert_eq!(cfg.sync.chunk_size, 10);
        assert_eq!(cfg.sync.time_zone, "UTC");
    }

    #[test]
    fn set_rejects_oversized_dedup_window() {
        let mut cfg = Config::default();
        let err = cfg.set("sync.dedup_window_secs", "9000000000000").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "sync.dedup_window_secs"));
        assert_eq!(cfg.sync.dedup_window_secs, 60);

        cfg.set("sync.dedup_window_secs", "86400").unwrap();
        assert_eq!(cfg.sync.dedup_window(), Duration::from_secs(86_400));
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.sync.user_id, "default");
    }

    #[test]
    fn load_from_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nchunk_size = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn save_and_reload_preserves_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.set("sync.user_id", "student-7").unwrap();
        cfg.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.sync.user_id, "student-7");
    }

    #[test]
    fn payload_options_follow_config() {
        let mut cfg = Config::default();
        cfg.sync.time_zone = "Asia/Tokyo".into();
        cfg.sync.category_marker = "5".into();
        let options = cfg.sync.payload_options().unwrap();
        assert_eq!(options.time_zone, chrono_tz::Asia::Tokyo);
        assert_eq!(options.category_marker, "5");
    }
}
