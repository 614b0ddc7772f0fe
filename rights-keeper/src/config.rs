//! Configuration for the upkeep keeper

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Keeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Seconds between upkeep checks
    pub interval_secs: u64,

    /// Run one check immediately on start instead of waiting a full interval
    pub check_on_start: bool,

    /// Registry the keeper maintains
    pub registry: rights_core::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "rights-keeper".to_string(),
            interval_secs: 60,
            check_on_start: true,
            registry: rights_core::Config::default(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    ///
    /// `KEEPER_CONFIG` names a TOML file to start from; `KEEPER_INTERVAL_SECS`
    /// overrides the interval. Registry settings come from the `RIGHTS_*`
    /// variables when no file is given.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("KEEPER_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Config {
                registry: rights_core::Config::from_env()?,
                ..Config::default()
            },
        };

        if let Ok(interval) = std::env::var("KEEPER_INTERVAL_SECS") {
            config.interval_secs = interval
                .parse()
                .map_err(|e| Error::Config(format!("Invalid KEEPER_INTERVAL_SECS: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::Config("interval_secs must be positive".to_string()));
        }
        Ok(())
    }
}
