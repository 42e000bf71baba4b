//! Job orchestration
//!
//! A job is prepared synchronously (decode, parse, partition) so that
//! unusable submissions are rejected before anything is staged. The prepared
//! job then runs as one task: chunks are staged, applied and cleaned up one at
//! a time in sequence order, and every outcome is folded into the job
//! aggregate. A failing chunk never stops the job.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use bulkrec_common::types::{
    ChunkProgress, ChunkResult, JobPhase, JobReport, JobStatus, ProgressEvent, StatusUpdate,
};

use super::aggregate::JobAggregate;
use super::chunker::{partition, Chunk};
use super::config::{JobOverrides, PipelineConfig};
use super::error::IngestError;
use super::invoker::ApplyInvoker;
use super::normalizer::{normalize, RawInput};
use super::progress::ProgressPublisher;
use super::retry::retry_with_backoff;
use super::stager::{job_prefix, object_name, ChunkStore, StageError, StagedReference};

/// A submission that passed validation and is ready to run
#[derive(Debug)]
pub struct PreparedJob {
    pub job_id: Uuid,
    pub encoding: String,
    pub lossy: bool,
    pub total_rows: u64,
    config: PipelineConfig,
    chunks: Vec<Chunk>,
}

impl PreparedJob {
    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

pub struct IngestPipeline {
    config: PipelineConfig,
    store: Arc<dyn ChunkStore>,
    invoker: Arc<dyn ApplyInvoker>,
    shutdown: CancellationToken,
}

impl IngestPipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ChunkStore>,
        invoker: Arc<dyn ApplyInvoker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            invoker,
            shutdown,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize and partition a submission
    ///
    /// Errors here mean the job cannot start; nothing has been staged.
    pub fn prepare(
        &self,
        raw: RawInput,
        overrides: &JobOverrides,
        progress: &ProgressPublisher,
    ) -> Result<PreparedJob, IngestError> {
        let job_id = Uuid::new_v4();
        let config = self.config.with_overrides(overrides)?;
        let raw = match &overrides.encoding {
            Some(label) => raw.with_declared_encoding(label.clone()),
            None => raw,
        };

        progress.emit(status(job_id, JobPhase::Normalizing, "Normalizing encoding and header".into()));
        let normalized = normalize(&raw, &config.encoding_policy()?)?;
        let rows = normalized.rows()?;
        let total_rows = rows.len() as u64;

        let chunks = partition(rows, config.chunk_size);
        progress.emit(ProgressEvent::Status(StatusUpdate {
            job_id,
            phase: JobPhase::Chunking,
            message: format!(
                "Split {} rows into {} chunks of at most {}",
                total_rows,
                chunks.len(),
                config.chunk_size
            ),
            sequence: None,
            total_chunks: Some(chunks.len() as u32),
        }));

        info!(
            %job_id,
            encoding = normalized.encoding(),
            lossy = normalized.is_lossy(),
            total_rows,
            chunks = chunks.len(),
            chunk_size = config.chunk_size,
            "Job prepared"
        );

        Ok(PreparedJob {
            job_id,
            encoding: normalized.encoding().to_string(),
            lossy: normalized.is_lossy(),
            total_rows,
            config,
            chunks,
        })
    }

    /// Run the job on its own task; it finishes even if the caller goes away
    pub fn spawn(self: &Arc<Self>, job: PreparedJob, progress: ProgressPublisher) -> JoinHandle<JobReport> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(job, progress).await })
    }

    #[instrument(name = "job", skip_all, fields(job_id = %job.job_id))]
    pub async fn run(&self, job: PreparedJob, progress: ProgressPublisher) -> JobReport {
        let PreparedJob {
            job_id,
            encoding,
            total_rows,
            config,
            chunks,
            ..
        } = job;

        let mut aggregate = JobAggregate::new(job_id, total_rows, Some(encoding));
        let total_chunks = chunks.len() as u32;

        if chunks.is_empty() {
            info!("No data rows; job complete");
            let report = aggregate.snapshot(JobStatus::Completed);
            progress.emit(ProgressEvent::terminal(report.clone()));
            return report;
        }

        let mut cancelled = false;
        for chunk in &chunks {
            if self.shutdown.is_cancelled() {
                warn!(
                    next_sequence = chunk.sequence,
                    total_chunks, "Shutdown requested; stopping before next chunk"
                );
                cancelled = true;
                break;
            }

            progress.emit(ProgressEvent::Status(StatusUpdate {
                job_id,
                phase: JobPhase::ProcessingChunk,
                message: format!("Processing chunk {}/{}", chunk.sequence, total_chunks),
                sequence: Some(chunk.sequence),
                total_chunks: Some(total_chunks),
            }));

            let result = self.process_chunk(job_id, &config, chunk).await;
            let chunk_report = aggregate.record(chunk, result).clone();

            if chunk_report.succeeded {
                info!(
                    sequence = chunk.sequence,
                    reconciled = chunk_report.reconciled,
                    row_errors = chunk_report.errors.len(),
                    "Chunk applied"
                );
            } else {
                warn!(
                    sequence = chunk.sequence,
                    first_line = chunk_report.first_line,
                    last_line = chunk_report.last_line,
                    errors = ?chunk_report.errors,
                    "Chunk failed; continuing with next chunk"
                );
            }

            progress.emit(ProgressEvent::ChunkComplete(ChunkProgress {
                sequence: chunk.sequence,
                total_chunks,
                chunk: chunk_report,
                aggregate: aggregate.snapshot(JobStatus::Running),
            }));

            if chunk.sequence < total_chunks {
                self.pause(config.inter_chunk_delay()).await;
            }
        }

        progress.emit(status(job_id, JobPhase::Finalizing, "Removing staged artifacts".into()));
        self.remove_leftovers(job_id, &config).await;

        let report = aggregate.snapshot(aggregate.final_status(cancelled));
        info!(
            status = %report.status,
            total_records = report.total_records,
            total_reconciled = report.total_reconciled,
            total_errors = report.total_errors,
            processing_time_ms = report.processing_time_ms,
            "Job finished"
        );

        progress.emit(ProgressEvent::terminal(report.clone()));
        report
    }

    /// Stage, apply and clean up one chunk; always yields a result
    async fn process_chunk(&self, job_id: Uuid, config: &PipelineConfig, chunk: &Chunk) -> ChunkResult {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let bytes = match chunk.to_csv() {
            Ok(bytes) => bytes,
            Err(e) => {
                return ChunkResult::failed(StageError::Serialize(e.to_string()).to_string(), elapsed_ms())
            },
        };

        let name = object_name(&config.staging_prefix, job_id, chunk.sequence);
        let reference = match self.stage(&name, &bytes, config).await {
            Ok(reference) => reference,
            Err(e) => {
                return ChunkResult::failed(format!("staging failed: {}", e), elapsed_ms());
            },
        };

        let result = self.invoker.apply(&reference).await;

        if let Err(e) = self.store.delete(&reference).await {
            warn!(reference = %reference, error = %e, "Failed to delete staged chunk");
        }

        result
    }

    async fn stage(
        &self,
        name: &str,
        bytes: &[u8],
        config: &PipelineConfig,
    ) -> Result<StagedReference, StageError> {
        let timeout = config.stage_timeout();
        let store = &self.store;

        retry_with_backoff(name, config.stage_max_retries, config.stage_retry_base(), || async move {
            match tokio::time::timeout(timeout, store.put(name, bytes.to_vec())).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout(timeout)),
            }
        })
        .await
    }

    /// Inter-chunk throttle; cut short by shutdown
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = self.shutdown.cancelled() => {},
        }
    }

    /// Delete anything still staged under this job, e.g. after a failed delete
    async fn remove_leftovers(&self, job_id: Uuid, config: &PipelineConfig) {
        let prefix = job_prefix(&config.staging_prefix, job_id);
        let leftovers = match self.store.list(&prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Could not list staged leftovers");
                return;
            },
        };

        if leftovers.is_empty() {
            return;
        }

        debug!(count = leftovers.len(), "Removing leftover staged chunks");
        for object in leftovers {
            if let Err(e) = self.store.delete(&object.reference).await {
                warn!(reference = %object.reference, error = %e, "Leftover staged chunk not removed");
            }
        }
    }
}

fn status(job_id: Uuid, phase: JobPhase, message: String) -> ProgressEvent {
    ProgressEvent::Status(StatusUpdate {
        job_id,
        phase,
        message,
        sequence: None,
        total_chunks: None,
    })
}
