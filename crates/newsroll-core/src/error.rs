//! Error types for newsroll-core

use thiserror::Error;

/// Result type for newsroll-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for newsroll-core
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The same external id was submitted twice in one request
    #[error("Duplicate work item id: {0}")]
    DuplicateItemId(i64),

    /// Category list contains the same label twice (case-insensitively)
    #[error("Duplicate category label: {0}")]
    DuplicateCategory(String),

    /// Invalid classification mode string
    #[error("Invalid classification mode: {0}")]
    InvalidMode(String),

    /// Configuration could not be used
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

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
