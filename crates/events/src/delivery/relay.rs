//! Progress relay with exponential-backoff retry.
//!
//! [`ProgressRelay`] posts `{"request_id", "progress_data"}` to the
//! consumer's `/update_progress` endpoint. Failed attempts are retried up
//! to the policy's attempt count, doubling the delay each time (1 s, 2 s).

use std::time::Duration;

use async_trait::async_trait;

use crate::progress::{ProgressSink, ProgressUpdate};

/// HTTP request timeout for a single relay attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for progress relay failures.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The consumer returned a non-2xx status code.
    #[error("Consumer returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry with a doubling delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressRelay
// ---------------------------------------------------------------------------

/// Delivers progress updates to the consumer service.
#[derive(Clone)]
pub struct ProgressRelay {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl ProgressRelay {
    /// * `consumer_url` - consumer base URL, e.g. `http://127.0.0.1:8090`.
    pub fn new(consumer_url: &str) -> Self {
        Self::with_policy(consumer_url, RetryPolicy::default())
    }

    pub fn with_policy(consumer_url: &str, policy: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            url: format!("{}/update_progress", consumer_url.trim_end_matches('/')),
            policy,
        }
    }

    /// Relay one update, retrying per the policy.
    ///
    /// Returns the last error once every attempt has failed.
    pub async fn relay(&self, request_id: &str, update: &ProgressUpdate) -> Result<(), RelayError> {
        let payload = serde_json::json!({
            "request_id": request_id,
            "progress_data": update,
        });

        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.try_send(&payload).await {
                Ok(()) => {
                    tracing::debug!(request_id, status = update.status(), "Progress update sent");
                    return Ok(());
                }
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %self.url,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Progress relay attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        request_id,
                        url = %self.url,
                        error = %e,
                        "Progress relay failed after all retries"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), RelayError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(RelayError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for ProgressRelay {
    async fn send(&self, request_id: &str, update: &ProgressUpdate) -> Result<(), RelayError> {
        self.relay(request_id, update).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_three_attempts_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
    }

    #[test]
    fn url_is_joined_without_double_slash() {
        let relay = ProgressRelay::new("http://127.0.0.1:8090/");
        assert_eq!(relay.url, "http://127.0.0.1:8090/update_progress");
    }

    #[test]
    fn relay_error_display_http_status() {
        let err = RelayError::HttpStatus(502);
        assert_eq!(err.to_string(), "Consumer returned HTTP 502");
    }
}
