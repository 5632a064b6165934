use crate::models::Timeframe;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use std::{env, fs, io};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "dashboard.toml";
pub const API_URL_ENV: &str = "NETWORK_MONITOR_API_URL";
pub const POLL_SECS_ENV: &str = "NETWORK_MONITOR_POLL_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unable to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct UiConfig {
    pub default_timeframe: Timeframe,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Reads `path` if it exists, falls back to defaults otherwise, then
    /// applies environment overrides and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(secs) = lookup(POLL_SECS_ENV) {
            self.polling.interval_secs =
                secs.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "polling.interval_secs",
                    reason: format!("{POLL_SECS_ENV}={secs:?} is not a number of seconds"),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid {
                field: "api.base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "api.base_url",
                reason: format!("{url:?} must start with http:// or https://"),
            });
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "api.request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "polling.interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn save_example(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_content = toml::to_string_pretty(&Config::default())?;
        fs::write(path, toml_content)?;
        Ok(())
    }
}
