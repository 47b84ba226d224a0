//! Layered configuration loading using figment.
//!
//! Sources, highest priority first:
//! 1. `GRAPHQL_ENDPOINT` / `TOKEN` (the variable names the form's deployment
//!    already uses)
//! 2. `GATEWAY_*` environment variables, `__` separating nested keys
//!    (`GATEWAY_HISTORY__YEAR_OFFSET=0`)
//! 3. `gateway.toml` in the working directory, if present
//! 4. Built-in defaults
//!
//! [`GatewayConfig::load_with_dotenv`] reads `.env` into the process
//! environment first.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::history::calendar::HistoryCalendar;

const CONFIG_FILE: &str = "gateway.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Missing required configuration value '{0}'")]
    Missing(&'static str),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Fixed offset, in hours, that decides which day a write belongs to.
    pub utc_offset_hours: i32,
    /// Added to the year in day file names.
    pub year_offset: i32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 7,
            year_offset: 543,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub graphql_endpoint: String,
    pub token: String,
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub upstream_timeout_secs: u64,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            graphql_endpoint: String::new(),
            token: String::new(),
            bind_addr: "0.0.0.0:4000".to_string(),
            data_dir: PathBuf::from("data"),
            upstream_timeout_secs: 30,
            history: HistoryConfig::default(),
        }
    }
}

// The bearer token must never end up in logs.
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("graphql_endpoint", &self.graphql_endpoint)
            .field("token", &"<redacted>")
            .field("bind_addr", &self.bind_addr)
            .field("data_dir", &self.data_dir)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("history", &self.history)
            .finish()
    }
}

impl GatewayConfig {
    /// Load and validate configuration from defaults, file and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` (if any) into the environment, then [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::load()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .merge(Env::raw().only(&["GRAPHQL_ENDPOINT", "TOKEN"]))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graphql_endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("graphql_endpoint"));
        }
        if !(self.graphql_endpoint.starts_with("http://")
            || self.graphql_endpoint.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "graphql_endpoint",
                reason: "must be an http(s) URL".into(),
            });
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::Missing("token"));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        self.calendar()?;
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn calendar(&self) -> Result<HistoryCalendar, ConfigError> {
        HistoryCalendar::new(self.history.utc_offset_hours, self.history.year_offset).ok_or(
            ConfigError::InvalidValue {
                field: "history.utc_offset_hours",
                reason: "must be between -23 and 23".into(),
            },
        )
    }
}
