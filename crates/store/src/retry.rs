//! Bounded retry with backoff for transient store failures.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Retry policy for transient store errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles on each subsequent one.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

/// Runs `operation` until it succeeds, fails non-transiently, or the
/// attempt budget is exhausted.
///
/// Only errors for which [`StoreError::is_transient`] holds are retried;
/// a transactional unit that failed transiently left no partial state, so
/// re-running it is safe.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &'static str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(
                    op = op_name,
                    attempt,
                    error = %err,
                    "transient store error, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("loop returns on final attempt")
}
