//! Invocation of the apply step for one staged chunk
//!
//! Implementations never fail past this boundary: every timeout, transport
//! problem, remote error status or undecodable response becomes a failed
//! [`ChunkResult`] carrying a synthetic error message.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use bulkrec_common::types::{ApplyRequest, ChunkResult};

use super::stager::StagedReference;
use crate::apply::ApplyService;

/// Longest remote error body carried into a chunk's error list
const MAX_ERROR_BODY: usize = 512;

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("apply step timed out after {0:?}")]
    Timeout(Duration),

    #[error("apply step unreachable: {0}")]
    Transport(String),

    #[error("apply step returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("apply step response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ApplyInvoker: Send + Sync {
    async fn apply(&self, reference: &StagedReference) -> ChunkResult;
}

/// Calls an external apply service over HTTP
pub struct HttpApplyInvoker {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpApplyInvoker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bulkrec/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    async fn call(&self, reference: &StagedReference) -> Result<ChunkResult, InvokeError> {
        let request = ApplyRequest {
            staged_reference: reference.to_string(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(InvokeError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<ChunkResult>().await.map_err(|e| {
            if e.is_timeout() {
                InvokeError::Timeout(self.timeout)
            } else {
                InvokeError::Decode(e.to_string())
            }
        })
    }

    fn classify(&self, err: reqwest::Error) -> InvokeError {
        if err.is_timeout() {
            InvokeError::Timeout(self.timeout)
        } else {
            InvokeError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ApplyInvoker for HttpApplyInvoker {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn apply(&self, reference: &StagedReference) -> ChunkResult {
        let started = Instant::now();
        match self.call(reference).await {
            Ok(result) => {
                debug!(
                    succeeded = result.succeeded,
                    reconciled = result.reconciled_count,
                    "Apply step responded"
                );
                result
            },
            Err(e) => {
                warn!(error = %e, "Apply invocation failed");
                ChunkResult::failed(e.to_string(), started.elapsed().as_millis() as u64)
            },
        }
    }
}

/// Runs the apply service inside this process
pub struct InProcessApplyInvoker {
    service: Arc<ApplyService>,
    timeout: Duration,
}

impl InProcessApplyInvoker {
    pub fn new(service: Arc<ApplyService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }
}

#[async_trait]
impl ApplyInvoker for InProcessApplyInvoker {
    #[instrument(skip(self))]
    async fn apply(&self, reference: &StagedReference) -> ChunkResult {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.service.apply(reference)).await {
            Ok(result) => result,
            Err(_) => {
                let e = InvokeError::Timeout(self.timeout);
                warn!(error = %e, "Apply invocation failed");
                ChunkResult::failed(e.to_string(), started.elapsed().as_millis() as u64)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reference() -> StagedReference {
        StagedReference::new("staging/job/chunk-00001.csv")
    }

    async fn invoker(server: &MockServer, timeout: Duration) -> HttpApplyInvoker {
        HttpApplyInvoker::new(format!("{}/api/v1/apply", server.uri()), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_successful_response_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/apply"))
            .and(body_json(serde_json::json!({
                "stagedReference": "staging/job/chunk-00001.csv"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "succeeded": true,
                "reconciledCount": 7999,
                "errors": ["line 12: record_code is null"],
                "processingDurationMs": 840
            })))
            .mount(&server)
            .await;

        let result = invoker(&server, Duration::from_secs(5)).await.apply(&reference()).await;
        assert!(result.succeeded);
        assert_eq!(result.reconciled_count, 7999);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_error_becomes_failed_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("apply pool exhausted"))
            .mount(&server)
            .await;

        let result = invoker(&server, Duration::from_secs(5)).await.apply(&reference()).await;
        assert!(!result.succeeded);
        assert_eq!(result.reconciled_count, 0);
        assert!(result.errors[0].contains("503"));
        assert!(result.errors[0].contains("apply pool exhausted"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let result = invoker(&server, Duration::from_millis(200)).await.apply(&reference()).await;
        assert!(!result.succeeded);
        assert!(result.errors[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_undecodable_body_becomes_failed_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let result = invoker(&server, Duration::from_secs(5)).await.apply(&reference()).await;
        assert!(!result.succeeded);
        assert!(result.errors[0].contains("could not be decoded"));
    }

    #[tokio::test]
    async fn test_unreachable_becomes_failed_result() {
        let invoker =
            HttpApplyInvoker::new("http://127.0.0.1:9/api/v1/apply", Duration::from_secs(2)).unwrap();
        let result = invoker.apply(&reference()).await;
        assert!(!result.succeeded);
        assert_eq!(result.errors.len(), 1);
    }
}
