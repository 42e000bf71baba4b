use std::sync::Arc;

use crate::ingest::{
    IngestError, IngestPipeline, JobOverrides, PreparedJob, ProgressPublisher, RawInput,
};

#[derive(Debug, Clone)]
pub struct SubmitIngestCommand {
    pub content: Vec<u8>,
    pub file_name: Option<String>,
    pub overrides: JobOverrides,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitIngestError {
    #[error("Request body is empty; send the file as the body or as multipart field 'file'")]
    ContentRequired,
    #[error("Multipart request has no 'file' field")]
    FileFieldMissing,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Preparing the job failed: {0}")]
    PrepareAborted(String),
}

impl SubmitIngestCommand {
    pub fn validate(&self) -> Result<(), SubmitIngestError> {
        if self.content.is_empty() {
            return Err(SubmitIngestError::ContentRequired);
        }
        if self.overrides.chunk_size == Some(0) {
            return Err(IngestError::InvalidOption("chunk_size must be at least 1".to_string()).into());
        }
        if let Some(label) = &self.overrides.encoding {
            if encoding_rs::Encoding::for_label(label.trim().as_bytes()).is_none() {
                return Err(IngestError::UnknownEncoding(label.clone()).into());
            }
        }
        Ok(())
    }
}

/// Validate and prepare a job; the caller decides how to run it
///
/// Decoding and partitioning run on the blocking pool.
#[tracing::instrument(skip(pipeline, command, progress), fields(bytes = command.content.len(), file_name = ?command.file_name))]
pub async fn handle(
    pipeline: Arc<IngestPipeline>,
    command: SubmitIngestCommand,
    progress: ProgressPublisher,
) -> Result<PreparedJob, SubmitIngestError> {
    command.validate()?;

    let SubmitIngestCommand {
        content, overrides, ..
    } = command;
    let job = tokio::task::spawn_blocking(move || {
        pipeline.prepare(RawInput::new(content), &overrides, &progress)
    })
    .await
    .map_err(|e| SubmitIngestError::PrepareAborted(e.to_string()))??;

    tracing::info!(
        job_id = %job.job_id,
        total_rows = job.total_rows,
        chunks = job.total_chunks(),
        "Ingest job accepted"
    );

    Ok(job)
}
