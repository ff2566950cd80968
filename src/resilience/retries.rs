//! Retry logic for node calls.
//!
//! # Design Decisions
//! - Only transport failures are retried; rate limiting and "not found"
//!   answers go straight back to the caller
//! - Jittered exponential backoff between attempts

use std::future::Future;
use std::time::Duration;

use crate::config::schema::RetryConfig;
use crate::resilience::backoff::backoff_delay;

/// How many times to attempt a call and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        if !config.enabled {
            return Self::none();
        }
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay, self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. Returns the last error in the latter cases.
    pub async fn run<T, E, F, Fut>(&self, label: &str, is_retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u32, String> = fast_policy(3)
            .run("test", |_| true, || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("down".to_string()) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), String> = fast_policy(2)
            .run("test", |_| true, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), String> = fast_policy(5)
            .run("test", |e: &String| e != "fatal", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_config_means_single_attempt() {
        let mut config = RetryConfig::default();
        config.enabled = false;
        assert_eq!(RetryPolicy::from_config(&config), RetryPolicy::none());
    }
}
