//! Error types for the bulkrec CLI
//!
//! Messages are user-facing and say what to try next.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// The server rejected the request
    #[error("Server rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// API server communication failed
    #[error("Server error: {0}. Ensure the bulkrec server is running (check with 'bulkrec health') and accessible.")]
    Api(String),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// The progress stream broke off or carried garbage
    #[error("Progress stream error: {0}")]
    Stream(String),

    /// The job finished but not every chunk was applied
    #[error("Job finished with status '{status}'; {failed} chunk(s) need re-submission")]
    JobIncomplete { status: String, failed: usize },

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions.")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("Network request failed: {0}. Check the server URL.")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse server response: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] bulkrec_common::BulkrecError),
}

impl CliError {
    /// Create an API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }
}
