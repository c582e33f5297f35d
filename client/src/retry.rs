//! Bounded exponential backoff for transient service failures.
//!
//! Only the pomodoro-increment call opts in: it fires unattended when a timer
//! ends, so a briefly unavailable service must not eat the count. Everything
//! else surfaces failure immediately.
//!
//! The schedule is deterministic: the delay before retry k is
//! `initial_delay * 2^(k-1)`, capped at `max_delay`, for at most
//! `max_retries` retries after the initial attempt.

use std::time::Duration;

use pomokan_types::ApiError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
    /// Backoff delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Delay before retry number `backoff_step + 1`.
#[must_use]
pub fn backoff_delay(backoff_step: u32, config: &RetryConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    Duration::from_secs_f64(base.min(config.max_delay.as_secs_f64()))
}

/// Run `operation`, retrying on [`ApiError::TransientUnavailable`] with
/// exponential backoff. Any other error, and success, return immediately.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, ApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut backoff_step = 0;
    loop {
        match operation().await {
            Err(err) if err.is_transient() && backoff_step < config.max_retries => {
                let delay = backoff_delay(backoff_step, config);
                tracing::debug!(
                    retry = backoff_step + 1,
                    delay_ms = delay.as_millis(),
                    "Transient failure; retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                backoff_step += 1;
            }
            outcome => return outcome,
        }
    }
}
