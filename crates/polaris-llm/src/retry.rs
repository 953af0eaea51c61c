use polaris_core::{PolarisError, Result};
use std::time::Duration;
use tracing::warn;

use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// Base delay for exponential backoff (doubles each retry).
pub const BASE_DELAY_MS: u64 = 1000;

/// Ceiling for a single backoff sleep.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// How a single generation call is retried and bounded.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 2 means up to 3 calls.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Deadline per attempt. `None` disables it.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            timeout: None,
        }
    }
}

/// Check if an error is transient and worth retrying.
pub fn is_retryable(err: &PolarisError) -> bool {
    match err {
        PolarisError::RateLimited { .. } | PolarisError::Timeout { .. } => true,
        PolarisError::LlmProvider(msg) => {
            msg.starts_with("HTTP 429")
                || msg.starts_with("HTTP 500")
                || msg.starts_with("HTTP 502")
                || msg.starts_with("HTTP 503")
                || msg.starts_with("HTTP 529")
                || msg.contains("timed out")
                || msg.contains("connection reset")
                || msg.contains("connection closed")
                || msg.contains("overloaded")
        }
        _ => false,
    }
}

/// Extract retry-after hint from a RateLimited error (in seconds).
fn retry_after_hint(err: &PolarisError) -> Option<u64> {
    if let PolarisError::RateLimited { retry_after_secs } = err {
        Some(*retry_after_secs)
    } else {
        None
    }
}

/// Delay before retry number `attempt_no` (0-based), capped at [`MAX_DELAY`].
pub fn backoff_delay(base: Duration, attempt_no: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt_no)).min(MAX_DELAY)
}

async fn attempt(
    provider: &dyn LlmProvider,
    request: &LlmRequest,
    timeout: Option<Duration>,
) -> Result<LlmResponse> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, provider.complete(request))
            .await
            .map_err(|_| PolarisError::Timeout {
                operation: format!("{} generation", provider.name()),
                secs: limit.as_secs(),
            })?,
        None => provider.complete(request).await,
    }
}

/// Retry a complete() call with exponential backoff on transient errors.
pub async fn complete_with_retry(
    provider: &dyn LlmProvider,
    request: &LlmRequest,
    policy: RetryPolicy,
) -> Result<LlmResponse> {
    let mut attempt_no = 0u32;
    loop {
        match attempt(provider, request, policy.timeout).await {
            Ok(resp) => return Ok(resp),
            Err(e) if is_retryable(&e) && attempt_no < policy.max_retries => {
                let delay = retry_after_hint(&e)
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff_delay(policy.base_delay, attempt_no));
                warn!(
                    provider = provider.name(),
                    attempt = attempt_no + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt_no += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
