// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Retry loop for rate-limited backend calls (§4.3).
//!
//! The policy is deliberately narrow: a `RateLimited` failure is retried a
//! bounded number of times with the backend-supplied `retry_after` plus a
//! fixed grace period; every other failure fails fast. This is expressed as
//! an explicit loop over `Result`, not exception-style control flow.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Extra sleep added on top of a backend's `retry_after` before retrying.
pub const RETRY_GRACE: Duration = Duration::from_secs(1);

/// Default number of total attempts (the initial call plus two retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// An error a [`retry`] loop can reason about.
pub trait Retryable {
    /// `true` if this failure is worth retrying (rate limiting); `false`
    /// means fail fast.
    fn is_retryable(&self) -> bool;

    /// How long the callee asked the caller to wait before retrying, if it
    /// said so explicitly.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first, non-retry call.
    pub max_attempts: u32,
    /// Used as the retry delay when the error does not carry its own
    /// `retry_after`.
    pub default_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_delay: Duration::from_secs(1),
        }
    }
}

/// Call `f` up to `policy.max_attempts` times, retrying only on
/// [`Retryable::is_retryable`] errors and sleeping `retry_after + 1s`
/// between attempts.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                let delay = err.retry_after().unwrap_or(policy.default_delay) + RETRY_GRACE;
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky {
        retryable: bool,
        retry_after: Option<Duration>,
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retryable_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result = retry(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Flaky {
                        retryable: true,
                        retry_after: Some(Duration::from_millis(10)),
                    })
                } else {
                    Ok::<_, Flaky>("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_fails_fast() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<&str, Flaky> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Flaky {
                    retryable: false,
                    retry_after: None,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            default_delay: Duration::from_millis(1),
        };
        let result: Result<&str, Flaky> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Flaky {
                    retryable: true,
                    retry_after: None,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
