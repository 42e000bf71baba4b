//! Bulkrec Server Library
//!
//! Ingests large delimited files from legacy producers and reconciles them
//! into a canonical record store.
//!
//! # Overview
//!
//! A submitted file flows through a fixed pipeline:
//!
//! - **Normalize**: detect the text encoding, decode to UTF-8 and replace the
//!   header with the canonical column names
//! - **Chunk**: split the data rows into bounded, ordered chunks
//! - **Stage**: write each chunk to temporary object storage
//! - **Apply**: hand the staged reference to the apply service, which upserts
//!   the rows into PostgreSQL keyed on the business key
//!
//! Chunks are processed strictly in order. A failing chunk is recorded in the
//! job report and the job moves on; only input that cannot be normalized at
//! all is rejected up front.
//!
//! # Layout
//!
//! - [`ingest`]: the pipeline stages, orchestration and progress channel
//! - [`apply`]: row coercion and reconciliation against the canonical store
//! - [`features`]: HTTP command handlers and routes, one slice per feature
//! - [`storage`]: S3-compatible object storage used for staging
//!
//! # Example
//!
//! ```no_run
//! use bulkrec_server::config::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     println!("chunk size: {}", config.pipeline.chunk_size);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod apply;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod storage;

// Re-export commonly used types
pub use error::{ApiResult, AppError};
