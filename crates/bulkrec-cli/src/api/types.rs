//! Request options and response bodies not shared with the server crate

use serde::Deserialize;

/// Per-job knobs sent as query parameters
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub chunk_size: Option<usize>,
    pub encoding: Option<String>,
}

impl SubmitOptions {
    pub fn query(&self, stream: bool) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if stream {
            query.push(("stream", "true".to_string()));
        }
        if let Some(chunk_size) = self.chunk_size {
            query.push(("chunk_size", chunk_size.to_string()));
        }
        if let Some(encoding) = &self.encoding {
            query.push(("encoding", encoding.clone()));
        }
        query
    }
}

/// Error body returned with 4xx/5xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub database: String,
    #[serde(default)]
    pub apply_mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_only_carries_set_options() {
        assert!(SubmitOptions::default().query(false).is_empty());

        let options = SubmitOptions {
            chunk_size: Some(250),
            encoding: None,
        };
        assert_eq!(
            options.query(true),
            vec![("stream", "true".to_string()), ("chunk_size", "250".to_string())]
        );
    }
}
