//! API client tests against a mocked server

#![allow(clippy::unwrap_used, clippy::expect_used)]

use uuid::Uuid;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use bulkrec_cli::api::{ApiClient, SubmitOptions};
use bulkrec_cli::CliError;
use bulkrec_common::types::{
    ChunkProgress, ChunkReport, JobPhase, JobReport, JobStatus, ProgressEvent, StatusUpdate,
};

fn chunk(sequence: u32, succeeded: bool) -> ChunkReport {
    ChunkReport {
        sequence,
        rows: 4,
        first_line: 4 * u64::from(sequence) - 2,
        last_line: 4 * u64::from(sequence) + 1,
        succeeded,
        reconciled: if succeeded { 4 } else { 0 },
        errors: if succeeded { vec![] } else { vec!["apply step returned HTTP 503".to_string()] },
        duration_ms: 3,
    }
}

fn report(status: JobStatus, chunks: Vec<ChunkReport>) -> JobReport {
    JobReport {
        job_id: Uuid::nil(),
        status,
        encoding: Some("Shift_JIS".to_string()),
        total_records: chunks.iter().map(|c| c.rows).sum(),
        total_reconciled: chunks.iter().filter(|c| c.succeeded).map(|c| c.reconciled).sum(),
        total_errors: chunks.iter().map(|c| c.errors.len() as u64).sum(),
        total_duration_ms: 6,
        processing_time_ms: 9,
        per_chunk: chunks,
    }
}

fn sse_body(events: &[ProgressEvent]) -> Vec<u8> {
    let mut body = String::from(":\n\n");
    for event in events {
        body.push_str(&format!("data: {}\n\n", serde_json::to_string(event).unwrap()));
    }
    body.into_bytes()
}

#[tokio::test]
async fn test_submit_returns_report() {
    let server = MockServer::start().await;
    let expected = report(JobStatus::Completed, vec![chunk(1, true), chunk(2, true)]);

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .and(query_param("chunk_size", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&expected))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).unwrap();
    let options = SubmitOptions {
        chunk_size: Some(4),
        encoding: None,
    };
    let report = client
        .submit("export.csv", b"h\nA,1\n".to_vec(), &options)
        .await
        .unwrap();

    assert_eq!(report, expected);
}

#[tokio::test]
async fn test_all_failed_job_still_returns_report() {
    let server = MockServer::start().await;
    let expected = report(JobStatus::Failed, vec![chunk(1, false)]);

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .respond_with(ResponseTemplate::new(502).set_body_json(&expected))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).unwrap();
    let report = client
        .submit("export.csv", b"h\nA,1\n".to_vec(), &SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.failed_chunks().count(), 1);
}

#[tokio::test]
async fn test_rejection_carries_server_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "success": false,
            "error": { "code": "INVALID_INPUT", "message": "Submitted file is empty" }
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).unwrap();
    let err = client
        .submit("empty.csv", Vec::new(), &SubmitOptions::default())
        .await
        .unwrap_err();

    match err {
        CliError::Rejected { code, message } => {
            assert_eq!(code, "INVALID_INPUT");
            assert_eq!(message, "Submitted file is empty");
        },
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_streaming_submission_delivers_events_in_order() {
    let server = MockServer::start().await;
    let job_id = Uuid::nil();
    let final_report = report(
        JobStatus::FailedWithPartialSuccess,
        vec![chunk(1, true), chunk(2, false)],
    );
    let events = vec![
        ProgressEvent::Status(StatusUpdate {
            job_id,
            phase: JobPhase::Chunking,
            message: "Split 8 rows into 2 chunks of at most 4".to_string(),
            sequence: None,
            total_chunks: Some(2),
        }),
        ProgressEvent::ChunkComplete(ChunkProgress {
            sequence: 1,
            total_chunks: 2,
            chunk: chunk(1, true),
            aggregate: report(JobStatus::Running, vec![chunk(1, true)]),
        }),
        ProgressEvent::ChunkComplete(ChunkProgress {
            sequence: 2,
            total_chunks: 2,
            chunk: chunk(2, false),
            aggregate: report(JobStatus::Running, vec![chunk(1, true), chunk(2, false)]),
        }),
        ProgressEvent::Failed(final_report.clone()),
    ];

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .and(query_param("stream", "true"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(&events), "text/event-stream"))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).unwrap();
    let mut seen = Vec::new();
    let report = client
        .submit_streaming("export.csv", b"h\n".to_vec(), &SubmitOptions::default(), |event| {
            seen.push(event.kind())
        })
        .await
        .unwrap();

    assert_eq!(report, final_report);
    assert_eq!(seen, vec!["status", "chunk-complete", "chunk-complete", "failed"]);
}

#[tokio::test]
async fn test_stream_without_terminal_event_is_an_error() {
    let server = MockServer::start().await;
    let events = vec![ProgressEvent::Status(StatusUpdate {
        job_id: Uuid::nil(),
        phase: JobPhase::Normalizing,
        message: "Normalizing encoding and header".to_string(),
        sequence: None,
        total_chunks: None,
    })];

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(&events), "text/event-stream"))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).unwrap();
    let result = client
        .submit_streaming("export.csv", b"h\n".to_vec(), &SubmitOptions::default(), |_| {})
        .await;

    assert!(matches!(result, Err(CliError::Stream(_))));
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "healthy",
            "version": "0.1.0",
            "database": "connected",
            "applyMode": "inline"
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).unwrap();
    let health = client.health().await.unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.database, "connected");
    assert_eq!(health.apply_mode.as_deref(), Some("inline"));
}

#[tokio::test]
async fn test_health_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "success": false,
            "error": { "code": "DATABASE_UNAVAILABLE", "message": "The database is unavailable" }
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).unwrap();
    let err = client.health().await.unwrap_err();
    assert!(err.to_string().contains("DATABASE_UNAVAILABLE"));
}
