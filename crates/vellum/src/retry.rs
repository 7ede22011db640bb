//! Bounded retry with exponential backoff for outbound HTTP calls.
//!
//! Only transport-level failures (connect errors, timeouts, broken
//! request streams) are retried. An HTTP status or a rejected execution
//! is an answer, not a failure, and is returned as-is.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Why [`with_retry`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last attempt failed (or the failure was not retryable).
    Failed(E),
    /// The cancellation token fired first.
    Cancelled,
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Whether a reqwest error is a transport failure worth retrying.
pub fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// Whether a reqwest error means the request never reached the server.
///
/// Used for calls that are not idempotent: a timeout or a broken body
/// stream may come after the upstream already acted on the request.
pub fn is_connect_failure(err: &reqwest::Error) -> bool {
    err.is_connect()
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    cancel: Option<&CancellationToken>,
    is_retryable: impl Fn(&E) -> bool,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let never = CancellationToken::new();
    let cancel = cancel.unwrap_or(&never);
    let mut delay = config.initial_delay;
    let mut tries = 0u32;

    loop {
        tries += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = attempt() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if tries > config.max_retries || !is_retryable(&err) {
            return Err(RetryError::Failed(err));
        }

        tracing::warn!(
            operation,
            attempt = tries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying",
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn next_delay_doubles() {
        let config = RetryConfig::default();
        assert_eq!(next_delay(Duration::from_millis(500), &config), Duration::from_secs(1));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = RetryConfig::default();
        assert_eq!(next_delay(Duration::from_secs(4), &config), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> =
            with_retry(&fast(1), "test", None, |_| true, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("connection reset".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> =
            with_retry(&fast(1), "test", None, |_| true, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Failed(e)) if e == "down"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> =
            with_retry(&fast(3), "test", None, |_| false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("rejected".to_string()) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_attempt_completes() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), RetryError<String>> =
            with_retry(&fast(1), "test", Some(&cancel), |_| true, || async {
                std::future::pending::<Result<(), String>>().await
            })
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
