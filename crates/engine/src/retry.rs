//! Bounded-backoff retry for transient failures.

use crate::error::{EngineError, EngineResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy: a fixed number of attempts with exponential backoff and a
/// per-attempt timeout. Only errors classified as transient are retried;
/// everything else surfaces immediately.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    op_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and base delay.
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            op_timeout: None,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Bound each attempt by a timeout; an elapsed attempt counts as a
    /// transient failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Run an operation, retrying transient failures with backoff.
    pub async fn run<T, F, Fut>(&self, what: &str, op: F) -> EngineResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut delay = self.base_delay;
        for attempt in 1..=self.attempts {
            let result = match self.op_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Transient(format!("{what} timed out"))),
                },
                None => op().await,
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(what, attempt, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::Fatal(format!("retry loop exited for {what}")))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50)).with_timeout(Duration::from_secs(30))
    }
}
