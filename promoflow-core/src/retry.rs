//! Bounded retry with exponential backoff for calls to external collaborators.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Retry policy for data-source and registry calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on every further attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    8_000
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(20);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let wait = policy.delay_for(attempt);
                info!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(operation, attempts = attempt + 1, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
