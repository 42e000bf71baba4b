//! Bulkrec CLI Library
//!
//! Command-line client for the bulkrec server.
//!
//! # Overview
//!
//! - **Submission**: send a producer export for reconciliation (`bulkrec submit`),
//!   either waiting for the final report or following live progress with `--stream`
//! - **Health**: check that the server and its database are reachable (`bulkrec health`)

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod commands;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use api::client::DEFAULT_SERVER_URL;

/// Bulkrec - bulk reconciliation client
#[derive(Parser, Debug)]
#[command(name = "bulkrec")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server URL
    #[arg(long, env = "BULKREC_SERVER_URL", default_value = DEFAULT_SERVER_URL, global = true)]
    pub server: String,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a file for reconciliation
    Submit {
        /// Delimited export to ingest
        file: PathBuf,

        /// Follow progress chunk by chunk
        #[arg(short, long)]
        stream: bool,

        /// Maximum rows per chunk (server default when omitted)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Text encoding to try first, e.g. shift_jis
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Check server health
    Health,
}
