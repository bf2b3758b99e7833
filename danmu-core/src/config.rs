use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::client::ClientOptions;
use crate::connection::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Room id (short or long) or live room URL
    pub room: String,
    /// 0 connects anonymously
    pub viewer_id: u64,
    /// `buvid3` of the viewer's browser
    pub device_id: String,
    pub user_agent: String,
    pub referer: String,
    /// Connect to this push host only
    pub host: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub retry_backoff_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Sent with room and endpoint lookups (`SESSDATA`, `buvid3`, ...)
    pub cookies: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            room: String::new(),
            viewer_id: 0,
            device_id: String::new(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            referer: "https://live.bilibili.com/".to_string(),
            host: None,
            heartbeat_interval_secs: 30,
            retry_backoff_ms: 2000,
            reconnect_delay_ms: 3,
            cookies: HashMap::new(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            retry: RetryPolicy::constant(Duration::from_millis(self.retry_backoff_ms)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // DANMU_CLIENT__ROOM, DANMU_LOGGING__LEVEL, ...
        builder = builder.add_source(
            Environment::with_prefix("DANMU")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check for settings the client cannot run with
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.client.room.trim().is_empty() {
            errors.push("client.room must be set".to_string());
        }
        if self.client.heartbeat_interval_secs == 0 {
            errors.push("client.heartbeat_interval_secs must be greater than 0".to_string());
        }
        if self.client.retry_backoff_ms == 0 {
            errors.push("client.retry_backoff_ms must be greater than 0".to_string());
        }
        if matches!(&self.client.host, Some(host) if host.trim().is_empty()) {
            errors.push("client.host must not be blank".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
