//! Resilient Call Wrapper
//!
//! Bounded retry with exponential backoff around fallible, possibly-remote
//! operations. The wrapper is an explicit decorator: the collector calls it
//! around each metadata fetch, which keeps the policy visible at every call
//! site and testable on its own. Attempts are fully independent; operations
//! passed in must be safe to repeat.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{SchemaError, SchemaResult};

/// Retry policy: `retries` additional attempts after the first, waiting
/// `base_delay * 2^attempt` between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (zero-based).
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `op`, retrying per `policy`. On exhaustion the returned error names
/// the total attempt count and carries the last underlying failure as its
/// cause.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> SchemaResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(cause) => {
                if attempt >= policy.retries {
                    return Err(SchemaError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(cause),
                    });
                }
                let delay = policy.delay(attempt);
                debug!(attempt = attempt + 1, ?delay, error = %cause, "retrying operation");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("flaky failure #{0}")]
    struct Flaky(u32);

    fn quick(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_waiting() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&quick(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Flaky>(n) }
        })
        .await
        .unwrap();
        assert_eq!(result, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn two_failures_then_success_uses_three_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&quick(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Flaky(n))
                } else {
                    Ok("metadata")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "metadata");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count_and_cause() {
        let calls = AtomicU32::new(0);
        let result: SchemaResult<()> = with_retry(&quick(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Flaky(n)) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(SchemaError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "flaky failure #2");
            }
            other => panic!("expected RetriesExhausted, got {:?}", other.map(|_| ())),
        }
        let rendered = with_retry(&quick(2), || async { Err::<(), _>(Flaky(0)) })
            .await
            .unwrap_err()
            .to_string();
        assert!(rendered.contains("3 attempts"), "got: {rendered}");
    }

    #[tokio::test]
    async fn zero_retries_means_a_single_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            retries: 0,
            base_delay: Duration::ZERO,
        };
        let result: SchemaResult<()> = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(0)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            retries: 4,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(3), Duration::from_millis(4000));
    }
}
