use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;

use bulkrec_common::types::JobStatus;

use super::commands::{submit, SubmitIngestCommand, SubmitIngestError};
use crate::api::response::ErrorResponse;
use crate::ingest::{progress, IngestError, IngestPipeline, JobOverrides};

pub fn ingest_routes() -> Router<Arc<IngestPipeline>> {
    Router::new().route("/", post(submit_file))
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    #[serde(default)]
    pub stream: bool,
    pub chunk_size: Option<usize>,
    pub encoding: Option<String>,
}

#[tracing::instrument(skip_all)]
async fn submit_file(
    State(pipeline): State<Arc<IngestPipeline>>,
    params: Result<Query<IngestParams>, QueryRejection>,
    request: Request,
) -> Result<Response, IngestApiError> {
    let Query(params) = params.map_err(|e| {
        IngestApiError::from(SubmitIngestError::Ingest(IngestError::InvalidOption(e.body_text())))
    })?;
    let wants_stream = params.stream || accepts_event_stream(request.headers());

    let (content, file_name) = read_submission(request).await?;
    let command = SubmitIngestCommand {
        content,
        file_name,
        overrides: JobOverrides {
            chunk_size: params.chunk_size,
            encoding: params.encoding,
        },
    };

    let (publisher, subscriber) = progress::channel();
    let job = submit::handle(Arc::clone(&pipeline), command, publisher.clone()).await?;
    let job_id = job.job_id;
    let running = pipeline.spawn(job, publisher);

    if wants_stream {
        let events = subscriber.into_stream().map(|event| {
            Ok::<_, Infallible>(
                Event::default()
                    .json_data(&event)
                    .unwrap_or_else(|_| Event::default().comment("unserializable event")),
            )
        });
        return Ok(Sse::new(events)
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    drop(subscriber);
    let report = running.await.map_err(|e| {
        tracing::error!(%job_id, error = %e, "Ingest task did not complete");
        IngestApiError::JobAborted
    })?;

    let status = if report.status == JobStatus::Failed {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)).into_response())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// File bytes from multipart field `file`, or the raw body otherwise
async fn read_submission(request: Request) -> Result<(Vec<u8>, Option<String>), IngestApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| IngestApiError::Rejected(e.status(), e.body_text()))?;
        return Ok((body.to_vec(), None));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| IngestApiError::Rejected(e.status(), e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IngestApiError::Rejected(e.status(), e.body_text()))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| IngestApiError::Rejected(e.status(), e.body_text()))?;
            return Ok((data.to_vec(), file_name));
        }
    }

    Err(SubmitIngestError::FileFieldMissing.into())
}

#[derive(Debug)]
enum IngestApiError {
    Submit(SubmitIngestError),
    /// Rejected by an extractor (body too large, bad multipart framing)
    Rejected(StatusCode, String),
    JobAborted,
}

impl From<SubmitIngestError> for IngestApiError {
    fn from(err: SubmitIngestError) -> Self {
        Self::Submit(err)
    }
}

impl IntoResponse for IngestApiError {
    fn into_response(self) -> Response {
        match self {
            IngestApiError::Submit(SubmitIngestError::Ingest(IngestError::InvalidOption(_)))
            | IngestApiError::Submit(SubmitIngestError::Ingest(IngestError::UnknownEncoding(_))) => {
                let error = ErrorResponse::new("INVALID_OPTION", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            IngestApiError::Submit(SubmitIngestError::PrepareAborted(ref message)) => {
                tracing::error!(error = %message, "Job preparation task failed");
                let error = ErrorResponse::new("INTERNAL_ERROR", "Ingest job could not be prepared");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
            IngestApiError::Submit(_) => {
                let error = ErrorResponse::new("INVALID_INPUT", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            IngestApiError::Rejected(status, ref message) => {
                let error = ErrorResponse::new("REQUEST_REJECTED", message.clone());
                (status, Json(error)).into_response()
            },
            IngestApiError::JobAborted => {
                let error = ErrorResponse::new("INTERNAL_ERROR", "Ingest job aborted unexpectedly");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}

impl std::fmt::Display for IngestApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit(e) => write!(f, "{}", e),
            Self::Rejected(status, message) => write!(f, "{}: {}", status, message),
            Self::JobAborted => f.write_str("ingest job aborted"),
        }
    }
}
