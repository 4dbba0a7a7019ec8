use crate::error::Result;
use std::future::Future;
use std::time::Duration;

pub const RETRIES_ENV: &str = "ROBERT_A11Y_RETRIES";
/// Backoff in seconds, fractions allowed
pub const DELAY_ENV: &str = "ROBERT_A11Y_DELAY";

/// Bounded retry for calls that race page navigation.
///
/// Only errors for which [`A11yError::is_context_destroyed`](crate::error::A11yError::is_context_destroyed)
/// holds are retried; everything else is returned on the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Defaults overridden by `ROBERT_A11Y_RETRIES` and `ROBERT_A11Y_DELAY`.
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(RETRIES_ENV).ok().as_deref(),
            std::env::var(DELAY_ENV).ok().as_deref(),
        )
    }

    fn from_values(retries: Option<&str>, delay: Option<&str>) -> Self {
        let mut policy = Self::default();
        if let Some(attempts) = retries.and_then(|v| v.trim().parse::<u32>().ok()) {
            policy.max_attempts = attempts.max(1);
        }
        if let Some(seconds) = delay
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
        {
            policy.backoff = Duration::from_secs_f64(seconds);
        }
        policy
    }

    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tried = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_context_destroyed() && tried < max_attempts => {
                    log::debug!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        operation,
                        tried,
                        max_attempts,
                        self.backoff,
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                    tried += 1;
                }
                Err(e) => {
                    if e.is_context_destroyed() {
                        log::debug!("{} failed after {} attempts: {}", operation, tried, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
