//! Error types for Floodgate.

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// The throttle was cancelled before a tick was observed
    #[error("canceled")]
    Canceled,

    /// A limiter was constructed with parameters it cannot honour
    #[error("Invalid limiter configuration: {0}")]
    InvalidConfig(String),

    /// An operation needed a Tokio runtime and none was running
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for FloodgateError {
    fn from(err: config::ConfigError) -> Self {
        FloodgateError::Config(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
