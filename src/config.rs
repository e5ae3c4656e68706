//! Configuration for stp-client

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connector::{ConnectorConfig, DEFAULT_TIMEOUT};
use crate::error::StpError;

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stp-client")
        .join("config.toml")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// STP service WebSocket URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Service name announced in Register; also the base of the generated client name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Language/runtime tag announced in Register
    #[serde(default = "default_language")]
    pub language: String,

    /// Fixed machine identifier. Generated per connector when unset.
    #[serde(default)]
    pub machine_id: Option<String>,

    /// Timeout used when a call does not supply one
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

fn default_url() -> String {
    "ws://localhost:9555".to_string()
}

fn default_service_name() -> String {
    "StpRustClient".to_string()
}

fn default_language() -> String {
    "Rust".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            service_name: default_service_name(),
            language: default_language(),
            machine_id: None,
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StpError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| StpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StpError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StpError::Config(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the connector cannot work with
    pub fn validate(&self) -> Result<(), StpError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(StpError::Config(format!(
                "url must use ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.service_name.trim().is_empty() {
            return Err(StpError::Config("service_name must not be empty".into()));
        }
        Ok(())
    }

    /// Default per-call timeout. Zero falls back to the built-in default.
    pub fn default_timeout(&self) -> Duration {
        match self.default_timeout_secs {
            0 => DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs),
        }
    }

    /// Settings for the transport connector
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            url: self.url.clone(),
            language: self.language.clone(),
            machine_id: self.machine_id.clone(),
            default_timeout: self.default_timeout(),
        }
    }
}
