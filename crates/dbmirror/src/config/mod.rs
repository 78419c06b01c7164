//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration if the file exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty map.
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ProviderConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl LocalConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }
}
