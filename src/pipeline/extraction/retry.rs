use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RecoveryError;

/// Per-call retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): initial, 2x, 4x ... capped.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Delay for a failed call, honoring a rate limiter's retry-after hint.
    fn delay_after(&self, error: &RecoveryError, retry: u32) -> Duration {
        let backoff = self.backoff_for(retry);
        match error {
            RecoveryError::RateLimited {
                retry_after_secs: Some(secs),
            } => backoff
                .max(Duration::from_secs(*secs))
                .min(Duration::from_millis(self.max_backoff_ms)),
            _ => backoff,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only transient errors are retried. The last error is returned when the
/// budget is spent.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RecoveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RecoveryError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(&e, attempt);
                tracing::warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Recovery call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(call = label, attempts = attempt, error = %e, "Recovery retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(500));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        let err = RecoveryError::RateLimited {
            retry_after_secs: Some(3600),
        };
        assert_eq!(policy.delay_after(&err, 1), Duration::from_millis(8_000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&fast_policy(3), "page 1", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RecoveryError::Transient("connection reset".into()))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("recovered"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&fast_policy(3), "page 2", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RecoveryError::Timeout(30)) }
        })
        .await;

        assert_eq!(result, Err(RecoveryError::Timeout(30)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&fast_policy(5), "page 3", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RecoveryError::Permanent("malformed page".into())) }
        })
        .await;

        assert!(matches!(result, Err(RecoveryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let _ = call_with_retry(&fast_policy(0), "doc", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RecoveryError::Transient("x".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
