//! API endpoint URL builders

/// Build health endpoint URL
pub fn health_url(base_url: &str) -> String {
    format!("{}/health", base_url.trim_end_matches('/'))
}

/// Build ingest endpoint URL
pub fn ingest_url(base_url: &str) -> String {
    format!("{}/api/v1/ingest", base_url.trim_end_matches('/'))
}
