//! Bounded retry with exponential backoff
//!
//! Used wherever an operation may fail transiently and a fixed number of
//! further attempts is acceptable (session launch, backend probes).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            ..Default::default()
        }
    }

    /// Delay before the given zero-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        Duration::from_millis((exponential as u64).min(self.max_delay_ms))
    }
}

/// Outcome of an exhausted retry loop
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Runs `operation` until it succeeds or `max_attempts` is reached
///
/// Returns the last error together with the number of attempts made.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    what: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let delay = config.delay_for(attempt);
        if !delay.is_zero() {
            debug!("Retrying {} in {:?} (attempt {}/{})", what, delay, attempt + 1, attempts);
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                if attempt >= attempts {
                    return Err(RetryExhausted { attempts, last: e });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_growth_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 3000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.delay_for(0), Duration::ZERO);
        assert_eq!(config.delay_for(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for(3), Duration::from_millis(3000));
        assert_eq!(config.delay_for(4), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(3, 1);
        let result: Result<u32, RetryExhausted<String>> = with_retry(&config, "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(format!("fail {}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(3, 1);
        let result: Result<(), RetryExhausted<String>> = with_retry(&config, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope".to_string()) }
        })
        .await;
        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last, "nope");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
