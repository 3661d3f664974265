//! Retry policy for reasoning service calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{LlmError, LlmResult};

/// Bounded retry with a per-attempt timeout that doubles on every attempt.
///
/// With `fail_fast` set (the default) the first failure is returned at once,
/// so callers fall back to local behaviour instead of waiting on an
/// overloaded service. Connection checks use [`RetryPolicy::exhaustive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Timeout of the first attempt
    pub base_timeout: Duration,
    /// Pause before the second attempt, doubled afterwards
    pub backoff: Duration,
    pub fail_fast: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_timeout: Duration::from_secs(10),
            backoff: Duration::from_millis(500),
            fail_fast: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_timeout,
            ..Self::default()
        }
    }

    /// Keep retrying after failures until attempts run out.
    pub fn exhaustive(mut self) -> Self {
        self.fail_fast = false;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Timeout applied to attempt `attempt` (0-based).
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        self.base_timeout.saturating_mul(1u32 << attempt.min(16))
    }

    /// Run `op` under this policy.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> LlmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LlmResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff.saturating_mul(1u32 << (attempt - 1).min(16));
                tokio::time::sleep(delay).await;
            }

            let limit = self.attempt_timeout(attempt);
            let error = match tokio::time::timeout(limit, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => LlmError::Timeout(limit),
            };

            warn!(
                attempt = attempt + 1,
                max_attempts = attempts,
                error = %error,
                "reasoning service call failed"
            );

            if self.fail_fast {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(LlmError::EmptyResponse))
    }
}
