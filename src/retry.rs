//! HTTP retry loop shared by the embedding and generation backends.
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (or `Retry-After`, capped
//!   at the longest backoff)
//! - timeouts and connection errors → retry
//! - any other non-success status → fail immediately, not retryable
//!
//! When the attempts run out the last error is returned marked retryable,
//! so callers can tell the user that trying again later may help.

use std::future::Future;
use std::time::Duration;

use crate::error::{CompanionError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Backoff before attempt `attempt` (1-based): base, 2×base, 4×base, … capped at 32×.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }

    /// Longest wait between attempts, including server-requested ones.
    fn max_delay(&self) -> Duration {
        self.base_delay * 32
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Send a request built by `f`, retrying transient failures.
///
/// Returns the first successful response for the caller to decode.
pub async fn send_with_retry<F, Fut>(
    provider: &str,
    policy: RetryPolicy,
    mut f: F,
) -> Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
{
    let mut last_err = None;
    let mut delay = Duration::ZERO;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
        }
        delay = if attempt < policy.max_retries {
            policy.backoff(attempt + 1)
        } else {
            Duration::ZERO
        };

        match f().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    if let Some(wait) = retry_after(&response) {
                        delay = wait.min(policy.max_delay());
                    }
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(provider, %status, attempt, "transient API error, will retry");
                    last_err = Some(CompanionError::provider(
                        provider,
                        format!("API error {status}: {}", body.trim()),
                        true,
                    ));
                    continue;
                }

                let body = response.text().await.unwrap_or_default();
                return Err(CompanionError::provider(
                    provider,
                    format!("API error {status}: {}", body.trim()),
                    false,
                ));
            }
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                tracing::warn!(provider, error = %e, attempt, "request failed, will retry");
                last_err = Some(CompanionError::provider(provider, e.to_string(), true));
            }
            Err(e) => {
                return Err(CompanionError::provider(provider, e.to_string(), false));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        CompanionError::provider(provider, "request failed after retries", true)
    }))
}
