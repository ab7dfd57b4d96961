//! Engine configuration, loadable from YAML

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Engine-wide settings shared by every request a [`crate::Shell`] launches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Environment applied to every process before the request's own overrides
    pub default_env: HashMap<String, String>,

    /// Sleep between drains while [`crate::Request::wait`] blocks
    pub poll_interval_ms: u64,

    /// How long cancel waits for a graceful exit before killing
    pub cancel_grace_ms: u64,

    /// Size of the buffer each reader thread reads into
    pub read_buffer_size: usize,

    /// Directory for materialized scripts; the system temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Interpreter for multi-line commands on Unix; `/bin/sh` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_env: HashMap::new(),
            poll_interval_ms: 10,
            cancel_grace_ms: 500,
            read_buffer_size: 4096,
            temp_dir: None,
            shell: None,
        }
    }
}

impl ShellConfig {
    /// Parse a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ShellConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        // A UTF-8 code point is up to four bytes and the decoder needs room for one.
        if self.read_buffer_size < 4 {
            return Err(ConfigError::Validation(format!(
                "read_buffer_size must be at least 4, got {}",
                self.read_buffer_size
            )));
        }

        if let Some(dir) = &self.temp_dir {
            if !dir.is_dir() {
                return Err(ConfigError::Validation(format!(
                    "temp_dir '{}' is not a directory",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Sleep between drains in a blocking wait
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Grace period before a cancel escalates to a kill
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}
