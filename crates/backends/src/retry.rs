//! Retry with exponential backoff for backend requests.
//!
//! Wraps non-streaming chat calls. Retries only errors classified as
//! retryable (rate limit, server error, timeout); everything else
//! propagates immediately. Each backoff wait is published on a watch
//! channel so the host's spinner can show the countdown.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use agentichat_core::{Result, RetryInfo};

/// Backoff configuration. Defaults to 3 attempts with 2s/4s/8s delays.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (0-indexed): base * 2^attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `operation` under the retry policy. Retry state is published on
/// `notify` before each sleep and cleared when the call settles.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    notify: &watch::Sender<Option<RetryInfo>>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                let _ = notify.send(None);
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = policy.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Retrying after transient error"
                );
                let _ = notify.send(Some(RetryInfo {
                    attempt: attempt + 1,
                    max_attempts: policy.max_attempts,
                    delay_secs: delay.as_secs(),
                }));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                let _ = notify.send(None);
                return Err(err);
            }
        }
    }
}
