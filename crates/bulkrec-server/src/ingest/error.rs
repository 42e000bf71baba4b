//! Errors that prevent a job from starting
//!
//! Once chunk processing has begun nothing aborts the job; failures below the
//! orchestrator are folded into the job report instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Submitted file is empty")]
    EmptyInput,

    #[error("Submitted file could not be parsed: {0}")]
    InvalidInput(String),

    #[error("Unknown text encoding label: {0}")]
    UnknownEncoding(String),

    #[error("Invalid job option: {0}")]
    InvalidOption(String),
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::InvalidInput(err.to_string())
    }
}
