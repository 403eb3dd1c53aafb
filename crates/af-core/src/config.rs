//! Configuration management for appfreeze

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("appfreeze")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Configuration for the toggle controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Unix socket path of the privileged broker
    pub broker_socket: PathBuf,

    /// Path of the persisted target selection
    pub store_path: PathBuf,

    /// Host program queried for per-target suspension flags
    pub probe_program: PathBuf,

    /// Host program invoked for the credential challenge
    pub verifier_program: PathBuf,

    /// Verifier exit code that means the user dismissed the challenge
    pub verifier_cancel_code: i32,

    /// OOM score adjustment applied while the toggle is active
    pub keepalive_oom_score: i32,

    /// Broker attach timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            broker_socket: PathBuf::from("/run/appfreeze/broker.sock"),
            store_path: default_config_dir().join("targets.toml"),
            probe_program: PathBuf::from("pkgctl"),
            verifier_program: PathBuf::from("fprintd-verify"),
            verifier_cancel_code: 3,
            keepalive_oom_score: -500,
            connect_timeout_secs: 5,
        }
    }
}

impl ControllerConfig {
    /// Broker attach timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Load the controller config, falling back to defaults if the file is absent
pub fn load_or_default(path: &Path) -> Result<ControllerConfig, ConfigError> {
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => Ok(ControllerConfig::default()),
        Err(e) => Err(e),
    }
}
