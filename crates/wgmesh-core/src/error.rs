//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating the node configuration.
///
/// All of these are fatal at startup; none are recoverable at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required configuration
    #[error("missing required configuration: {0}")]
    Missing(String),

    /// Invalid configuration value
    #[error("invalid configuration for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// Failed to load configuration file
    #[error("failed to load config from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Dev mode combined with security parameters, or neither mode selected
    #[error("{0}")]
    ModeConflict(String),
}

impl ConfigError {
    /// Create an `Invalid` error for a configuration key.
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for configuration operations.
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
