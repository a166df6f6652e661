use std::future::Future;
use std::time::Duration;

use crate::error::{IndexError, Result};

/// Bounded retry with per-attempt timeout and exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline of a single attempt. An attempt past it counts as a transient failure.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `f` until it succeeds, fails structurally, or attempts run out.
///
/// # Errors
///
/// Returns the last error: a structural error immediately, a transient one
/// (including [`IndexError::Timeout`]) once `max_attempts` is exhausted.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &'static str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<IndexError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let err = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e.into(),
            Err(_) => IndexError::Timeout {
                operation,
                elapsed_ms: u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };

        attempt += 1;
        if !err.is_transient() || attempt >= attempts {
            return Err(err);
        }
        let delay = policy.backoff(attempt - 1);
        tracing::warn!(
            operation,
            attempt,
            max_attempts = attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
