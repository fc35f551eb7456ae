//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("Timeout '{0}' must be greater than zero")]
    InvalidTimeout(&'static str),

    #[error("Ping period must be shorter than the pong wait")]
    PingPeriodTooLong,

    #[error("Capacity '{0}' must be greater than zero")]
    InvalidCapacity(&'static str),

    #[error("Maximum message size must be greater than zero")]
    InvalidMessageSize,

    #[error("Decode failure budget must be greater than zero when set")]
    InvalidDecodeFailureBudget,
}
