//! Ferry configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use ferry_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[engine]\nhub_capacity = 64").unwrap();
//! assert_eq!(config.engine.hub_capacity, 64);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [engine]
//! hub_capacity = 1000
//! plugin_channel_capacity = 1000
//! pool_capacity = 2000
//! ticker_interval_secs = 10
//!
//! [log]
//! level = "info"
//! ```

mod engine;
mod error;
mod logging;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use engine::EngineConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Router, pool, and channel settings
    pub engine: EngineConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Validate the configuration
    ///
    /// Capacities must be positive; a zero-capacity hub or pool would
    /// deadlock the pipeline on the first pack.
    fn validate(&self) -> Result<()> {
        if self.engine.hub_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "engine.hub_capacity must be greater than zero".into(),
            ));
        }
        if self.engine.plugin_channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "engine.plugin_channel_capacity must be greater than zero".into(),
            ));
        }
        if self.engine.pool_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "engine.pool_capacity must be greater than zero".into(),
            ));
        }
        if self.engine.ticker_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.ticker_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
