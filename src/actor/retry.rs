//! Bounded retry with exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// One retry, matching what a hover can afford to wait
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Run `operation`, retrying only errors `should_retry` accepts.
///
/// Any other error, or the last one once retries run out, is returned as is.
pub async fn with_retry_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retries = 0;
    let mut delay = policy.initial_delay;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if retries >= policy.max_retries || !should_retry(&err) {
            return Err(err);
        }
        retries += 1;

        tracing::warn!(
            "Transient failure (retry {}/{}): {}. Waiting {:?}",
            retries,
            policy.max_retries,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(policy.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_transient_error_retried_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry_if(&quick(2), |_| true, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 3 { Err("busy") } else { Ok(n) } }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry_if(&quick(3), |e| *e == "busy", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("forbidden") }
        })
        .await;

        assert_eq!(result, Err("forbidden"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry_if(&RetryPolicy::default(), |_| true, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("busy") }
        })
        .await;

        assert_eq!(result, Err("busy"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
