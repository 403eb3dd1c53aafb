//! Error types for the appfreeze ecosystem

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the appfreeze ecosystem
#[derive(Error, Debug)]
pub enum AfError {
    /// Controller error
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Target store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures the toggle controller resolves into a state transition plus a
/// user-visible message. None of these propagate as a crash.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Broker never attached; retry is user-triggered, never automatic
    #[error("Privileged broker is unavailable")]
    ConnectionUnavailable,

    /// User or policy refused the broker permission grant
    #[error("Broker permission denied")]
    PermissionDenied,

    /// Command attempted without an attached, permitted broker.
    /// Contract violation if the state machine is followed; fatal to the
    /// transition, not to the process.
    #[error("Not authorized to run privileged commands")]
    NotAuthorized,

    /// Privileged command exited non-zero
    #[error("Command failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        /// Process exit code
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// Connection dropped mid-command; the result was discarded and the
    /// reconciliation probe decides the final state
    #[error("Broker connection lost during command")]
    TransportLost,

    /// Credential challenge canceled or failed; reverted silently
    #[error("Credential challenge aborted")]
    AuthChallengeAborted,

    /// Selection mutation attempted while a suspension window is open
    #[error("Target selection is locked while suspension is active")]
    SelectionLocked,

    /// Activation attempted with no targets selected
    #[error("No targets selected")]
    EmptySelection,

    /// Selection could not be persisted
    #[error("Target store failure: {0}")]
    StoreFailed(String),

    /// Controller owner task is gone
    #[error("Controller is shut down")]
    Shutdown,
}

/// Target-store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store file could not be read or written
    #[error("Store I/O error at {path}: {source}")]
    Io {
        /// Store file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Store file is not valid TOML
    #[error("Store parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Store contents could not be serialized
    #[error("Store serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
