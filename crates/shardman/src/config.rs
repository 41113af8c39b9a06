//! Configuration for the operation manager
//!
//! Loaded from YAML; every field has a default so partial files are fine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Delay between convergence checks of a running split (seconds)
    pub poll_interval_secs: u64,
    /// Number of completed operations kept in history
    pub history_capacity: usize,
    /// Store map holding in-progress operations, keyed by operation key
    pub op_map_key: String,
    /// Store list holding completed operations, most recent first
    pub completed_ops_key: String,
    /// Data directory of the file-backed operation store
    pub data_dir: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            history_capacity: 100,
            op_map_key: "shardman:ops".to_string(),
            completed_ops_key: "shardman:completed_ops".to_string(),
            data_dir: "./shardman_data".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.op_map_key.is_empty() || self.completed_ops_key.is_empty() {
            return Err(ConfigError::Invalid("store keys must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
