//! HTTP API client for the bulkrec server

use futures::StreamExt;
use reqwest::{multipart, Client, Response};
use std::time::Duration;
use tracing::debug;

use bulkrec_common::sse::FrameDecoder;
use bulkrec_common::types::{JobReport, ProgressEvent};

use crate::api::{endpoints, ErrorBody, HealthStatus, SubmitOptions};
use crate::error::{CliError, Result};

// ============================================================================
// API Client Constants
// ============================================================================

/// Default timeout for API requests in seconds.
/// Can be overridden via BULKREC_API_TIMEOUT_SECS environment variable.
/// A non-streaming submission holds the request open for the whole job.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 3600;

/// Default server URL when not specified via flag or environment variable.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// API client for the bulkrec server
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let timeout_secs = std::env::var("BULKREC_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_API_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("bulkrec-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetch the server's health report
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(endpoints::health_url(&self.base_url)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Submit a file and wait for the final report
    ///
    /// A job in which every chunk failed comes back as 502 with a report body,
    /// so that status is not treated as an error here.
    pub async fn submit(
        &self,
        file_name: &str,
        content: Vec<u8>,
        options: &SubmitOptions,
    ) -> Result<JobReport> {
        let response = self.post_file(file_name, content, options, false).await?;

        if response.status() == reqwest::StatusCode::BAD_GATEWAY {
            return Ok(response.json().await?);
        }

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Submit a file and follow its progress stream
    ///
    /// `on_event` sees every event in order; the terminal event's report is
    /// returned.
    pub async fn submit_streaming<F>(
        &self,
        file_name: &str,
        content: Vec<u8>,
        options: &SubmitOptions,
        mut on_event: F,
    ) -> Result<JobReport>
    where
        F: FnMut(&ProgressEvent),
    {
        let response = self.post_file(file_name, content, options, true).await?;
        let response = check_status(response).await?;

        let mut decoder = FrameDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(bytes) = body.next().await {
            for event in decoder.push(&bytes?)? {
                on_event(&event);
                match event {
                    ProgressEvent::Complete(report) | ProgressEvent::Failed(report) => {
                        return Ok(report)
                    },
                    _ => {},
                }
            }
        }

        if decoder.has_pending() {
            return Err(CliError::stream("stream ended in the middle of an event"));
        }
        Err(CliError::stream("stream ended before the job finished"))
    }

    async fn post_file(
        &self,
        file_name: &str,
        content: Vec<u8>,
        options: &SubmitOptions,
        stream: bool,
    ) -> Result<Response> {
        let url = endpoints::ingest_url(&self.base_url);
        debug!(%url, file_name, bytes = content.len(), stream, "Submitting file");

        let part = multipart::Part::bytes(content).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let mut request = self.client.post(&url).query(&options.query(stream)).multipart(form);
        if stream {
            request = request.header(reqwest::header::ACCEPT, "text/event-stream");
        }

        Ok(request.send().await?)
    }
}

/// Turn an error status into [`CliError`], preferring the server's own message
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(CliError::Rejected {
            code: body.error.code,
            message: body.error.message,
        }),
        Err(_) => Err(CliError::api(format!("HTTP {}: {}", status, text.trim()))),
    }
}
