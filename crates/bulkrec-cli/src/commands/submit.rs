//! `bulkrec submit` command implementation
//!
//! Uploads one export and prints the job report. Exits non-zero unless every
//! chunk was applied, so scripts can tell which slices to re-submit.

use colored::Colorize;
use std::path::Path;

use bulkrec_common::types::{JobReport, JobStatus};

use crate::api::{ApiClient, SubmitOptions};
use crate::error::{CliError, Result};
use crate::progress::JobProgress;

pub async fn run(server: &str, file: &Path, stream: bool, options: SubmitOptions) -> Result<()> {
    if !file.is_file() {
        return Err(CliError::FileNotFound(file.display().to_string()));
    }
    let content = tokio::fs::read(file).await?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());

    let client = ApiClient::new(server)?;

    let report = if stream {
        let progress = JobProgress::new();
        let result = client
            .submit_streaming(&file_name, content, &options, |event| progress.handle(event))
            .await;
        progress.abandon();
        result?
    } else {
        client.submit(&file_name, content, &options).await?
    };

    print_report(&report);
    check_outcome(&report)
}

pub fn print_report(report: &JobReport) {
    let status = match report.status {
        JobStatus::Completed => report.status.as_str().green().bold(),
        JobStatus::FailedWithPartialSuccess | JobStatus::Cancelled => {
            report.status.as_str().yellow().bold()
        },
        _ => report.status.as_str().red().bold(),
    };

    println!("{} {}", "Job:".cyan().bold(), report.job_id);
    println!("  Status:     {}", status);
    if let Some(encoding) = &report.encoding {
        println!("  Encoding:   {}", encoding);
    }
    println!("  Records:    {}", report.total_records);
    println!("  Reconciled: {}", report.total_reconciled);
    println!("  Errors:     {}", report.total_errors);
    println!("  Chunks:     {}", report.per_chunk.len());
    println!("  Time:       {} ms", report.processing_time_ms);

    let failed: Vec<_> = report.failed_chunks().collect();
    if !failed.is_empty() {
        println!();
        println!("{}", "Failed chunks:".red().bold());
        for chunk in failed {
            println!(
                "  #{} (lines {}-{}, {} rows): {}",
                chunk.sequence,
                chunk.first_line,
                chunk.last_line,
                chunk.rows,
                chunk.errors.join("; ")
            );
        }
    }
}

/// `Ok` only when every chunk was applied
pub fn check_outcome(report: &JobReport) -> Result<()> {
    if report.status == JobStatus::Completed {
        return Ok(());
    }
    Err(CliError::JobIncomplete {
        status: report.status.to_string(),
        failed: report.failed_chunks().count(),
    })
}
