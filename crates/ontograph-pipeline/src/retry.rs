//! Retry/backoff controller.
//!
//! One parameterized controller wraps every I/O-bound stage: fact
//! generation, validation (for the schema fetch it triggers), and both
//! commit branches. Failures classified [`FailureClass::Transient`] are
//! retried with capped exponential backoff; permanent failures surface
//! immediately. After the attempt budget the last error is returned wrapped
//! with the attempt count.
//!
//! Delays go through `tokio::time::sleep`, so tests drive the controller on
//! the paused clock without wall-clock waits.

use crate::config::{env_f64, env_ms, env_u32};
use crate::error::{FailureClass, PipelineError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded-retry policy: attempt `k` (1-based) sleeps
/// `min(base_delay * backoff_multiplier^(k-1), max_delay)` before retrying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_u32("ONTOGRAPH_RETRY_MAX_ATTEMPTS", defaults.max_attempts),
            base_delay: env_ms("ONTOGRAPH_RETRY_BASE_DELAY_MS", defaults.base_delay),
            backoff_multiplier: env_f64("ONTOGRAPH_RETRY_MULTIPLIER", defaults.backoff_multiplier),
            max_delay: env_ms("ONTOGRAPH_RETRY_MAX_DELAY_MS", defaults.max_delay),
        }
    }

    /// Delay before retrying after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Run `op` under `policy`, retrying transient failures.
///
/// `op` is a factory producing one attempt's future, so each retry starts a
/// fresh attempt rather than polling a consumed future.
pub async fn retry<T, F, Fut>(
    stage: &'static str,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(stage, attempt, "stage succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.failure_class() == FailureClass::Permanent => {
                debug!(stage, attempt, error = %err, "permanent failure, not retrying");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(stage, attempt, error = %err, "retry budget exhausted");
                return Err(PipelineError::RetriesExhausted {
                    stage,
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(stage, attempt, delay_ms = delay.as_millis() as u64, error = %err,
                    "transient failure, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
