//! Bulkrec CLI - Main entry point

use bulkrec_cli::{Cli, Commands};
use bulkrec_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("bulkrec-cli")
        .build();

    // Environment variables take precedence; the CLI works without logging
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _log_guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> bulkrec_cli::Result<()> {
    match &cli.command {
        Commands::Submit {
            file,
            stream,
            chunk_size,
            encoding,
        } => {
            let options = bulkrec_cli::api::SubmitOptions {
                chunk_size: *chunk_size,
                encoding: encoding.clone(),
            };
            bulkrec_cli::commands::submit::run(&cli.server, file, *stream, options).await
        },

        Commands::Health => bulkrec_cli::commands::health::run(&cli.server).await,
    }
}
