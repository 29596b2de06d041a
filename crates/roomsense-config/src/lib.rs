//! Configuration for the roomsense engine.
//!
//! TOML file + environment loading and translation to
//! `roomsense_core::EngineConfig`. The backend URL is the only
//! required setting; everything else defaults to values suited to a
//! small sensor fleet.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use roomsense_core::EngineConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backend_url is required (set it in the config file or ROOMSENSE_BACKEND_URL)")]
    MissingBackendUrl,

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config struct ──────────────────────────────────────────────

/// Top-level TOML configuration.
///
/// Field names double as environment variable suffixes under the
/// `ROOMSENSE_` prefix, e.g. `ROOMSENSE_BACKEND_URL`.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Backend base URL (e.g., "http://sensors.local:8000/api").
    pub backend_url: Option<String>,

    /// Seconds between HTTP snapshot refreshes. 0 disables polling.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds of silence after which a device shows offline.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// First reconnect delay after a stream failure, in seconds.
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_secs: u64,

    /// Upper bound on the reconnect delay, in seconds.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,

    /// Whether to open the live stream. Off means poll-only.
    #[serde(default = "default_websocket_enabled")]
    pub websocket_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            poll_interval_secs: default_poll_interval(),
            offline_threshold_secs: default_offline_threshold(),
            request_timeout_secs: default_request_timeout(),
            reconnect_initial_secs: default_reconnect_initial(),
            reconnect_max_secs: default_reconnect_max(),
            websocket_enabled: default_websocket_enabled(),
        }
    }
}

fn default_poll_interval() -> u64 {
    120
}
fn default_offline_threshold() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    5
}
fn default_reconnect_initial() -> u64 {
    1
}
fn default_reconnect_max() -> u64 {
    30
}
fn default_websocket_enabled() -> bool {
    true
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "roomsense", "roomsense").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("roomsense");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path();

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("ROOMSENSE_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Translation to EngineConfig ─────────────────────────────────────

impl Config {
    /// Validate and build an `EngineConfig`.
    ///
    /// A missing or unparseable backend URL is fatal: starting an
    /// engine that can never reach anything is not a useful degraded
    /// mode. A zero offline threshold is rejected for the same reason
    /// (every device would render offline forever).
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let raw = self
            .backend_url
            .as_deref()
            .ok_or(ConfigError::MissingBackendUrl)?;

        let base_url: Url = raw.parse().map_err(|_| ConfigError::Validation {
            field: "backend_url".into(),
            reason: format!("invalid URL: {raw}"),
        })?;

        if self.offline_threshold_secs == 0 {
            return Err(ConfigError::Validation {
                field: "offline_threshold_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let mut config = EngineConfig::new(base_url);
        config.poll_interval = Duration::from_secs(self.poll_interval_secs);
        config.offline_threshold = Duration::from_secs(self.offline_threshold_secs);
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.reconnect_initial_delay = Duration::from_secs(self.reconnect_initial_secs);
        config.reconnect_max_delay = Duration::from_secs(self.reconnect_max_secs);
        config.websocket_enabled = self.websocket_enabled;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert!(config.backend_url.is_none());
        assert_eq!(config.poll_interval_secs, 120);
        assert_eq!(config.offline_threshold_secs, 300);
        assert_eq!(config.request_timeout_secs, 5);
        assert!(config.websocket_enabled);
    }

    #[test]
    fn missing_backend_url_is_fatal() {
        let err = Config::default().to_engine_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingBackendUrl));
    }

    #[test]
    fn invalid_backend_url_is_fatal() {
        let config = Config {
            backend_url: Some("not a url".into()),
            ..Config::default()
        };
        let err = config.to_engine_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "backend_url"));
    }

    #[test]
    fn zero_offline_threshold_is_rejected() {
        let config = Config {
            backend_url: Some("http://localhost:8000/api".into()),
            offline_threshold_secs: 0,
            ..Config::default()
        };
        let err = config.to_engine_config().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { field, .. } if field == "offline_threshold_secs")
        );
    }

    #[test]
    fn valid_config_translates() {
        let config = Config {
            backend_url: Some("http://localhost:8000/api".into()),
            poll_interval_secs: 60,
            websocket_enabled: false,
            ..Config::default()
        };

        let engine = config.to_engine_config().unwrap();
        assert_eq!(engine.base_url.as_str(), "http://localhost:8000/api");
        assert_eq!(engine.poll_interval, Duration::from_secs(60));
        assert_eq!(engine.offline_threshold, Duration::from_secs(300));
        assert!(!engine.websocket_enabled);
    }

    #[test]
    fn env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ROOMSENSE_BACKEND_URL", "http://10.0.0.5:8000/api");
            jail.set_env("ROOMSENSE_POLL_INTERVAL_SECS", "30");

            let figment = Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Env::prefixed("ROOMSENSE_"));
            let config: Config = figment.extract()?;

            assert_eq!(config.backend_url.as_deref(), Some("http://10.0.0.5:8000/api"));
            assert_eq!(config.poll_interval_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn toml_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    backend_url = "http://sensors.local:8000/api"
                    offline_threshold_secs = 600
                    websocket_enabled = false
                "#,
            )?;

            let figment = Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file("config.toml"));
            let config: Config = figment.extract()?;

            assert_eq!(
                config.backend_url.as_deref(),
                Some("http://sensors.local:8000/api")
            );
            assert_eq!(config.offline_threshold_secs, 600);
            assert!(!config.websocket_enabled);
            Ok(())
        });
    }
}
