//! Sync configuration.
//!
//! Loaded from the TOML file named by `TETHER_CONFIG` when set, otherwise
//! from `TETHER_*` environment variables.
//!
//! ```toml
//! [sync]
//! api_base_url = "https://api.example.com/v1"
//! request_timeout_secs = 15
//! data_dir = "/home/me/.tether"
//! event_capacity = 256
//! ```
//!
//! `${VAR}` placeholders in the file are replaced from the environment.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use tether_core::defaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for tether_core::Error {
    fn from(e: ConfigError) -> Self {
        tether_core::Error::Config(e.to_string())
    }
}

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "TETHER_CONFIG";

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backend base URL, e.g. `https://api.example.com/v1`.
    pub api_base_url: String,
    /// Per-request timeout. The only timeout in the sync path.
    pub request_timeout_secs: u64,
    /// Root of the plain and secure local stores.
    pub data_dir: PathBuf,
    /// Event bus buffer capacity.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::API_BASE_URL.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            data_dir: PathBuf::from(defaults::DATA_DIR),
            event_capacity: defaults::EVENT_BUS_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Load from `TETHER_CONFIG` if set, else from the environment, then validate.
    pub fn load() -> ConfigResult<Self> {
        let config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!("Loading sync config from: {}", path);
                Self::from_file(Path::new(path.trim()))?
            }
            _ => {
                debug!("{} not set, using environment variables", CONFIG_PATH_ENV);
                Self::from_env()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file with a `[sync]` table.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&substitute_env_vars(&content))
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        #[derive(Deserialize)]
        struct TomlRoot {
            #[serde(default)]
            sync: SyncConfig,
        }

        let root: TomlRoot = toml::from_str(content)?;
        Ok(root.sync)
    }

    /// Build from `TETHER_*` environment variables, defaulting the rest.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: lookup("TETHER_API_URL").unwrap_or(defaults.api_base_url),
            request_timeout_secs: lookup("TETHER_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            data_dir: lookup("TETHER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            event_capacity: lookup("TETHER_EVENT_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.event_capacity),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.api_base_url.is_empty() {
            return Err(ConfigError::Validation(
                "api_base_url cannot be empty".to_string(),
            ));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::Validation(format!(
                "api_base_url must start with http:// or https://, got: {}",
                self.api_base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn plain_store_dir(&self) -> PathBuf {
        self.data_dir.join(defaults::PLAIN_STORE_DIR)
    }

    pub fn secure_store_dir(&self) -> PathBuf {
        self.data_dir.join(defaults::SECURE_STORE_DIR)
    }
}

/// Replace `${VAR}` with the variable's value; unknown variables stay as-is.
fn substitute_env_vars(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
