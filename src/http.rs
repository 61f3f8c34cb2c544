//! Retrying HTTP transport shared by the outbound service clients.
//!
//! Retries are a transport concern: callers above this layer see a single
//! request that either produced a successful response or failed for good.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential backoff: initial × 2^attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Statuses worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Send the request built by `build`, retrying transient failures.
///
/// A non-success status that is not retryable (or that persists past the
/// last attempt) is returned as an error carrying the response body.
pub async fn send_with_retry<F>(policy: &RetryPolicy, label: &str, build: F) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let outcome = build().send().await;
        let last = attempt >= policy.max_retries;

        match outcome {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                let status = resp.status();
                if last || !is_retryable_status(status) {
                    let body = resp.text().await.unwrap_or_default();
                    anyhow::bail!("{label} returned {status}: {body}");
                }
                tracing::warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    %status,
                    "{label} returned a transient status, retrying"
                );
            }
            Err(e) => {
                let transient = e.is_connect() || e.is_timeout() || e.is_request();
                if last || !transient {
                    return Err(e).with_context(|| format!("Failed to reach {label}"));
                }
                tracing::warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    error = %e,
                    "{label} request failed, retrying"
                );
            }
        }

        tokio::time::sleep(policy.backoff(attempt)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(300));
        assert_eq!(policy.backoff(1), Duration::from_millis(600));
        assert_eq!(policy.backoff(2), Duration::from_millis(1200));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(10), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_without_retry_budget() {
        let client = reqwest::Client::new();
        // Port 9 (discard) on localhost is closed in test environments.
        let result = send_with_retry(&RetryPolicy::none(), "test endpoint", || {
            client.get("http://127.0.0.1:9/")
        })
        .await;
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("test endpoint"));
    }
}
