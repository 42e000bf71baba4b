//! Wire types shared by the server and the CLI
//!
//! All JSON field names are camelCase; enum tags are kebab-case.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Apply Service Contract
// ============================================================================

/// Request body sent to the apply service for one staged chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub staged_reference: String,
}

/// Outcome of applying one chunk, produced exactly once per chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub succeeded: bool,
    pub reconciled_count: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    pub processing_duration_ms: u64,
}

impl ChunkResult {
    /// A chunk-level failure carrying a single synthetic error message
    pub fn failed(message: impl Into<String>, processing_duration_ms: u64) -> Self {
        Self {
            succeeded: false,
            reconciled_count: 0,
            errors: vec![message.into()],
            processing_duration_ms,
        }
    }
}

// ============================================================================
// Job Reports
// ============================================================================

/// Lifecycle status of a job as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Running,
    Completed,
    FailedWithPartialSuccess,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::FailedWithPartialSuccess => "failed-with-partial-success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-chunk line of the job report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReport {
    pub sequence: u32,
    pub rows: u64,
    /// Source file lines of the first and last row (header is line 1)
    #[serde(default)]
    pub first_line: u64,
    #[serde(default)]
    pub last_line: u64,
    pub succeeded: bool,
    pub reconciled: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Job summary; both the JSON response and the terminal stream frame carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub total_records: u64,
    pub total_reconciled: u64,
    pub total_errors: u64,
    /// Sum of the per-chunk processing durations
    pub total_duration_ms: u64,
    /// Wall-clock time since the job started
    pub processing_time_ms: u64,
    pub per_chunk: Vec<ChunkReport>,
}

impl JobReport {
    /// Chunks whose apply step did not succeed; these slices need re-submission
    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.per_chunk.iter().filter(|c| !c.succeeded)
    }
}

// ============================================================================
// Progress Events
// ============================================================================

/// Coarse pipeline phase named in status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobPhase {
    Normalizing,
    Chunking,
    ProcessingChunk,
    Finalizing,
}

/// Payload of a `status` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub job_id: Uuid,
    pub phase: JobPhase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
}

/// Payload of a `chunk-complete` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub sequence: u32,
    pub total_chunks: u32,
    pub chunk: ChunkReport,
    /// Cumulative aggregate after this chunk
    pub aggregate: JobReport,
}

/// One event on the progress stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum ProgressEvent {
    Status(StatusUpdate),
    ChunkComplete(ChunkProgress),
    Complete(JobReport),
    Failed(JobReport),
}

impl ProgressEvent {
    /// Terminal event for a finished job: `complete` only when nothing failed
    pub fn terminal(report: JobReport) -> Self {
        if report.status == JobStatus::Completed {
            ProgressEvent::Complete(report)
        } else {
            ProgressEvent::Failed(report)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Status(_) => "status",
            ProgressEvent::ChunkComplete(_) => "chunk-complete",
            ProgressEvent::Complete(_) => "complete",
            ProgressEvent::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete(_) | ProgressEvent::Failed(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(status: JobStatus) -> JobReport {
        JobReport {
            job_id: Uuid::nil(),
            status,
            encoding: Some("Shift_JIS".to_string()),
            total_records: 10,
            total_reconciled: 7,
            total_errors: 1,
            total_duration_ms: 40,
            processing_time_ms: 55,
            per_chunk: vec![ChunkReport {
                sequence: 1,
                rows: 10,
                first_line: 2,
                last_line: 11,
                succeeded: true,
                reconciled: 7,
                errors: vec!["row 4: record_code is required".to_string()],
                duration_ms: 40,
            }],
        }
    }

    #[test]
    fn test_terminal_report_shape() {
        let value = serde_json::to_value(report(JobStatus::Completed)).unwrap();
        assert_eq!(value["totalRecords"], 10);
        assert_eq!(value["totalReconciled"], 7);
        assert_eq!(value["totalErrors"], 1);
        assert_eq!(value["processingTimeMs"], 55);
        assert_eq!(value["status"], "completed");
        assert_eq!(value["perChunk"][0]["sequence"], 1);
        assert_eq!(value["perChunk"][0]["durationMs"], 40);
        assert_eq!(value["perChunk"][0]["firstLine"], 2);
        assert_eq!(value["perChunk"][0]["lastLine"], 11);
    }

    #[test]
    fn test_progress_event_tagging() {
        let event = ProgressEvent::terminal(report(JobStatus::FailedWithPartialSuccess));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "failed");
        assert_eq!(value["payload"]["status"], "failed-with-partial-success");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_apply_contract_field_names() {
        let request = serde_json::to_value(ApplyRequest {
            staged_reference: "staging/job/chunk-00001.csv".to_string(),
        })
        .unwrap();
        assert_eq!(request, json!({ "stagedReference": "staging/job/chunk-00001.csv" }));

        let result: ChunkResult = serde_json::from_value(json!({
            "succeeded": true,
            "reconciledCount": 12,
            "processingDurationMs": 80
        }))
        .unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.reconciled_count, 12);
    }

    #[test]
    fn test_failed_chunks_filter() {
        let mut r = report(JobStatus::FailedWithPartialSuccess);
        r.per_chunk.push(ChunkReport {
            sequence: 2,
            rows: 5,
            first_line: 12,
            last_line: 16,
            succeeded: false,
            reconciled: 0,
            errors: vec!["transport error".to_string()],
            duration_ms: 3,
        });
        let failed: Vec<u32> = r.failed_chunks().map(|c| c.sequence).collect();
        assert_eq!(failed, vec![2]);
    }
}
