//! Running totals for one job

use std::time::Instant;
use uuid::Uuid;

use bulkrec_common::types::{ChunkReport, ChunkResult, JobReport, JobStatus};

use super::chunker::Chunk;

/// Owned and mutated by the orchestrator only; counts never decrease
#[derive(Debug)]
pub struct JobAggregate {
    job_id: Uuid,
    encoding: Option<String>,
    total_rows: u64,
    total_reconciled: u64,
    total_errors: u64,
    total_duration_ms: u64,
    per_chunk: Vec<ChunkReport>,
    started: Instant,
}

impl JobAggregate {
    pub fn new(job_id: Uuid, total_rows: u64, encoding: Option<String>) -> Self {
        Self {
            job_id,
            encoding,
            total_rows,
            total_reconciled: 0,
            total_errors: 0,
            total_duration_ms: 0,
            per_chunk: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Fold one resolved chunk into the totals
    ///
    /// Only succeeded chunks contribute to the reconciled total.
    pub fn record(&mut self, chunk: &Chunk, result: ChunkResult) -> &ChunkReport {
        if result.succeeded {
            self.total_reconciled += result.reconciled_count;
        }
        self.total_errors += result.errors.len() as u64;
        self.total_duration_ms += result.processing_duration_ms;

        let (first_line, last_line) = chunk.line_span().unwrap_or_default();
        self.per_chunk.push(ChunkReport {
            sequence: chunk.sequence,
            rows: chunk.len() as u64,
            first_line,
            last_line,
            succeeded: result.succeeded,
            reconciled: result.reconciled_count,
            errors: result.errors,
            duration_ms: result.processing_duration_ms,
        });
        &self.per_chunk[self.per_chunk.len() - 1]
    }

    pub fn chunks_resolved(&self) -> usize {
        self.per_chunk.len()
    }

    /// Terminal status from the per-chunk outcomes
    pub fn final_status(&self, cancelled: bool) -> JobStatus {
        let failed = self.per_chunk.iter().filter(|c| !c.succeeded).count();
        if cancelled {
            JobStatus::Cancelled
        } else if failed == 0 {
            JobStatus::Completed
        } else if failed == self.per_chunk.len() {
            JobStatus::Failed
        } else {
            JobStatus::FailedWithPartialSuccess
        }
    }

    pub fn snapshot(&self, status: JobStatus) -> JobReport {
        JobReport {
            job_id: self.job_id,
            status,
            encoding: self.encoding.clone(),
            total_records: self.total_rows,
            total_reconciled: self.total_reconciled,
            total_errors: self.total_errors,
            total_duration_ms: self.total_duration_ms,
            processing_time_ms: self.started.elapsed().as_millis() as u64,
            per_chunk: self.per_chunk.clone(),
        }
    }
}
