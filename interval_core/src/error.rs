//! Error types for the interval_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for interval_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workout storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Heart-rate sensor connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failure to connect to a streaming heart-rate sensor
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The platform has no way to reach a sensor
    #[error("heart-rate sensors are not supported on this platform")]
    Unsupported,

    /// The user dismissed the device chooser
    #[error("connection cancelled by user")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl ConnectionError {
    /// Whether the failure was the user backing out rather than a fault
    pub fn is_cancellation(&self) -> bool {
        match self {
            ConnectionError::Cancelled => true,
            ConnectionError::Failed(message) => message.to_lowercase().contains("cancelled"),
            ConnectionError::Unsupported => false,
        }
    }
}

/// Failure to fetch a batch of readings from the remote service
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("not authorized with the remote service")]
    NotAuthorized,

    #[error("request failed: {0}")]
    Http(String),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),
}
