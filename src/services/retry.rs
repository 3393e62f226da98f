//! Timeout and bounded-retry combinators for collaborator calls.

use std::{future::Future, time::Duration};
use thiserror::Error;
use tracing::warn;

/// Outcome of a single attempt that did not succeed.
#[derive(Debug, Error)]
pub enum OpError<E> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Failed(E),
}

/// Every attempt allowed by a [`RetryPolicy`] failed.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts: {last}")]
pub struct Exhausted<E: std::error::Error + 'static> {
    pub attempts: u32,
    #[source]
    pub last: OpError<E>,
}

/// Attempts, per-attempt timeout and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub timeout: Duration,
    pub delay: Duration,
}

/// Run `op`, giving up after `limit`.
pub async fn with_timeout<T, E, F>(limit: Duration, op: F) -> Result<T, OpError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(OpError::Failed(err)),
        Err(_) => Err(OpError::TimedOut(limit)),
    }
}

/// Run `op` under `policy`, starting a fresh attempt after each failure or
/// timeout until the attempts run out.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match with_timeout(policy.timeout, op()).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!(label, attempt, attempts, error = %err, "attempt failed, retrying");
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => {
                return Err(Exhausted {
                    attempts,
                    last: err,
                });
            }
        }
    }
}
