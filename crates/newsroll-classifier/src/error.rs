//! Error types for newsroll-classifier
//!
//! Content problems (bad JSON, wrong ids, unknown labels) never surface here;
//! they are retried and, if need be, degraded. Only failures the retry loop
//! cannot fix are errors.

use std::time::Duration;
use thiserror::Error;

/// Result type for newsroll-classifier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for newsroll-classifier
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication, connectivity or provider failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The configured deadline passed before the call finished
    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The request cannot be classified as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing API key or unusable client settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] newsroll_core::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
