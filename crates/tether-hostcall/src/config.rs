//! Host configuration (`tether.toml`)

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub host: HostSection,
    pub strings: StringsSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Name given to the dedicated owner thread
    pub thread_name: String,
    /// Milliseconds between automatic ticks. 0 means ticks are driven
    /// explicitly by the embedder.
    pub tick_interval_ms: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            thread_name: "tether-main".to_string(),
            tick_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringsSection {
    /// Cache positive string id lookups
    pub cache: bool,
}

impl Default for StringsSection {
    fn default() -> Self {
        Self { cache: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Default `env_logger` filter when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Interval between automatic ticks, if any
    pub fn tick_interval(&self) -> Option<Duration> {
        match self.host.tick_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
