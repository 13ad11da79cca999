//! Configuration management for pngsift.
//!
//! Configuration is loaded from the platform config directory (for example
//! `~/.config/pngsift/config.toml` on Linux) with sensible defaults when the
//! file is absent. CLI flags override config values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default I/O chunk buffer size in bytes.
///
/// Matches the fixed read buffer the tool has always used; small enough to
/// keep peak memory bounded, large enough that file sources rarely suspend.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Root configuration structure for pngsift.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// I/O settings
    pub io: IoConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// I/O settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Chunk buffer size in bytes for streaming reads
    pub chunk_size: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", or "error"
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories, falling back to
    /// `~/.pngsift/config.toml` if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("io", "pngsift", "pngsift")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".pngsift").join("config.toml")
            })
    }

    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.io.chunk_size == 0 {
            return Err(ConfigError::Validation("io.chunk_size must be > 0".into()));
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "logging.level must be a valid level, got {other:?}"
                )));
            }
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "logging.format must be \"pretty\" or \"json\", got {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}
