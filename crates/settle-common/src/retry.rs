//! Retry utilities with exponential backoff and jitter.
//!
//! Used where a transient failure should be retried rather than surfaced,
//! such as deleting registered test objects during cleanup. Convergence waits
//! do not use this: they poll on a fixed interval against a deadline.
//!
//! # Example
//!
//! ```ignore
//! use settle_common::retry::{retry_with_backoff_if, RetryConfig};
//!
//! let result = retry_with_backoff_if(
//!     &RetryConfig::fixed(Duration::from_secs(1), Duration::from_secs(200)),
//!     "delete_cluster",
//!     |e: &Error| e.is_retryable(),
//!     || async { api.delete_cluster(namespace, name).await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Retry on a fixed interval for roughly `timeout`
    ///
    /// Attempts are capped so the total sleep stays near the timeout.
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            (timeout.as_millis() / interval.as_millis().max(1)).max(1)
        };
        Self {
            max_attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            initial_delay: interval,
            max_delay: interval,
            backoff_multiplier: 1.0,
        }
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Retries until success, until `max_attempts` is exhausted, or until
/// `is_retryable` rejects an error, whichever comes first.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name for logging purposes
/// * `is_retryable` - Classifies errors; non-retryable errors return at once
/// * `operation` - The async operation to retry
pub async fn retry_with_backoff_if<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }

                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                // Exponential backoff, capped at max_delay
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        }
    }

    fn always(_: &&str) -> bool {
        true
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result: Result<i32, &str> =
            retry_with_backoff_if(&fast(3), "op", always, || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, &str> = retry_with_backoff_if(&fast(5), "op", always, || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("fail")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, &str> = retry_with_backoff_if(&fast(3), "op", always, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("always fails")
            }
        })
        .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_at_once() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, &str> =
            retry_with_backoff_if(&fast(5), "op", |e: &&str| *e != "forbidden", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("forbidden")
                }
            })
            .await;

        assert_eq!(result, Err("forbidden"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fixed_config_bounds_attempts_by_timeout() {
        let config = RetryConfig::fixed(Duration::from_secs(1), Duration::from_secs(200));
        assert_eq!(config.max_attempts, 200);
        assert_eq!(config.initial_delay, config.max_delay);
        assert_eq!(config.backoff_multiplier, 1.0);
    }
}
