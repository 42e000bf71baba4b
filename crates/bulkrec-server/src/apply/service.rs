//! The apply step: staged chunk in, [`ChunkResult`] out

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument};

use bulkrec_common::types::ChunkResult;

use super::coerce::coerce;
use super::reconcile::{CanonicalStore, ReconcileError, ReconcileSummary};
use crate::ingest::normalizer::SourceRow;
use crate::ingest::stager::{ChunkStore, StageError, StagedReference};

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Staged chunk unavailable: {0}")]
    Stage(#[from] StageError),

    #[error("Staged chunk is malformed: {0}")]
    Parse(String),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
}

pub struct ApplyService {
    staging: Arc<dyn ChunkStore>,
    records: Arc<dyn CanonicalStore>,
}

impl ApplyService {
    pub fn new(staging: Arc<dyn ChunkStore>, records: Arc<dyn CanonicalStore>) -> Self {
        Self { staging, records }
    }

    /// Apply one chunk; chunk-level failures become `succeeded = false`
    pub async fn apply(&self, reference: &StagedReference) -> ChunkResult {
        let started = Instant::now();
        match self.try_apply(reference).await {
            Ok(summary) => ChunkResult {
                succeeded: true,
                reconciled_count: summary.reconciled,
                errors: summary.errors,
                processing_duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => {
                error!(reference = %reference, error = %e, "Apply failed");
                ChunkResult::failed(e.to_string(), started.elapsed().as_millis() as u64)
            },
        }
    }

    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn try_apply(&self, reference: &StagedReference) -> Result<ReconcileSummary, ApplyError> {
        let bytes = self.staging.get(reference).await?;
        let rows = parse_chunk(&bytes)?;
        let row_count = rows.len();

        let mut coerced = Vec::with_capacity(row_count);
        let mut errors = Vec::new();
        for row in &rows {
            match coerce(row) {
                Ok(canonical) => coerced.push(canonical),
                Err(e) => errors.push(e.to_string()),
            }
        }

        let mut summary = self.records.reconcile(coerced).await?;
        errors.append(&mut summary.errors);
        summary.errors = errors;

        info!(
            rows = row_count,
            reconciled = summary.reconciled,
            inserted = summary.inserted,
            updated = summary.updated,
            row_errors = summary.errors.len(),
            "Chunk applied"
        );

        Ok(summary)
    }
}

/// Parse a staged chunk; its first line is the canonical header
fn parse_chunk(bytes: &[u8]) -> Result<Vec<SourceRow>, ApplyError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ApplyError::Parse(e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let values: Vec<&str> = record.iter().collect();
        rows.push(SourceRow::new(line, &values));
    }
    Ok(rows)
}
