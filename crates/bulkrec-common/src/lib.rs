//! Bulkrec Common Library
//!
//! Shared wire types, logging setup, and error handling for the bulkrec workspace.
//!
//! # Overview
//!
//! This crate provides the pieces that both the server and the CLI need:
//!
//! - **Types**: Progress events, job reports, and the apply service contract
//! - **SSE**: Incremental decoding of `data: <json>\n\n` progress frames
//! - **Logging**: `tracing` subscriber configuration shared by all binaries
//! - **Error Handling**: Common error and result types
//!
//! # Example
//!
//! ```no_run
//! use bulkrec_common::sse::FrameDecoder;
//! use bulkrec_common::types::ProgressEvent;
//!
//! fn feed(bytes: &[u8]) -> bulkrec_common::Result<Vec<ProgressEvent>> {
//!     let mut decoder = FrameDecoder::new();
//!     decoder.push(bytes)
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod sse;
pub mod types;

// Re-export commonly used types
pub use error::{BulkrecError, Result};
