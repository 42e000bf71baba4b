//! Error types shared across bulkrec crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, BulkrecError>;

/// Main error type for the common crate
#[derive(Error, Debug)]
pub enum BulkrecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed progress frame: {0}")]
    Frame(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
