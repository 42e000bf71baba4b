//! Bounded retry with exponential backoff for async operations

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// `base * 2^(attempt - 1)` for attempt 1, 2, 3...
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Run `operation` until it succeeds or `max_retries` extra attempts are spent
///
/// Returns the last error on exhaustion.
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    max_retries: u32,
    base: Duration,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                let delay = backoff_duration(base, attempt);
                warn!(
                    label,
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(e),
        }
    }
}
