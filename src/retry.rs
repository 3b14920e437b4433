// 🔁 Retry Policy - exponential backoff for shard writes and uploads

use std::time::Duration;
use tracing::warn;

use crate::context::RunContext;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,

    pub initial_backoff: Duration,

    /// Backoff growth per attempt (1.0 = constant)
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before attempt `attempt` (1-based; the first attempt has none).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32 - 2);
        self.initial_backoff.mul_f64(factor)
    }

    /// Run `op` until it succeeds, the error is not retryable, attempts run
    /// out, or the context stops the run. Returns the last error.
    pub fn run<T, E, F, R>(
        &self,
        ctx: &RunContext,
        label: &str,
        mut op: F,
        is_retryable: R,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display + From<crate::error::SyncError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    let backoff = self.backoff_for(attempt + 1);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    ctx.sleep(backoff).map_err(E::from)?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
