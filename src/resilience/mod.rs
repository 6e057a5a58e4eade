//! Resilience layer - retry and backoff around every external call
//!
//! One generic retry loop, parameterized by a `RetryPolicy` carrying the
//! dependency's classification table and backoff schedule. Three policies
//! exist (sheets, telegram, exchange); see `policies`.

mod guarded;
pub mod policies;

pub use guarded::{GuardedFeed, GuardedNotifier, GuardedStore};

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::ServiceError;

/// What to do with a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Give up quietly; the caller treats it as a soft failure
    Skip,
    /// Sleep with exponential backoff, consuming one attempt
    Backoff,
    /// Refresh credentials and retry; only honoured on the first attempt
    RefreshThenRetry,
    /// Sleep exactly this long and retry without consuming an attempt
    Wait(Duration),
    /// Propagate immediately
    Fail,
}

pub type Classifier = fn(&ServiceError) -> Verdict;

/// Per-dependency retry configuration
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub name: &'static str,
    pub classify: Classifier,
    /// Maximum number of backoff retries
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    /// Upper bound of the uniform jitter added to each backoff
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Backoff for a 0-based attempt: `min(base * 2^attempt, cap) + jitter`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        let exp = self.base.saturating_mul(factor).min(self.cap);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };
        exp + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    /// Classified as not worth retrying nor reporting (bad request, not found)
    #[error("skipped: {0}")]
    Skipped(#[source] ServiceError),

    #[error("gave up after {attempts} retries: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error(transparent)]
    Fatal(ServiceError),

    #[error("credential refresh failed: {0}")]
    Refresh(#[source] ServiceError),
}

/// Something that can renew the credentials a call depends on
#[async_trait]
pub trait CredentialRefresh: Send + Sync {
    async fn refresh_credentials(&self) -> Result<(), ServiceError>;
}

/// Run `op` until it succeeds or `policy` says stop
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    refresher: Option<&dyn CredentialRefresh>,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match (policy.classify)(&err) {
            Verdict::Skip => {
                warn!(
                    service = policy.name,
                    status = ?err.status(),
                    reason = ?err.reason(),
                    error = %err,
                    "Skipping call"
                );
                return Err(RetryError::Skipped(err));
            }
            Verdict::Wait(delay) => {
                warn!(
                    service = policy.name,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Rate limited, waiting before retry"
                );
                tokio::time::sleep(delay).await;
            }
            Verdict::Backoff if attempt < policy.max_attempts => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    service = policy.name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    status = ?err.status(),
                    reason = ?err.reason(),
                    "Retrying with exponential backoff + jitter"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Verdict::Backoff => {
                error!(service = policy.name, attempts = attempt, error = %err, "Retry budget exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: err,
                });
            }
            Verdict::RefreshThenRetry if attempt == 0 => {
                let Some(refresher) = refresher else {
                    return Err(RetryError::Fatal(err));
                };
                warn!(service = policy.name, "Authorization expired, refreshing credentials");
                refresher
                    .refresh_credentials()
                    .await
                    .map_err(RetryError::Refresh)?;
                attempt += 1;
            }
            Verdict::RefreshThenRetry | Verdict::Fail => return Err(RetryError::Fatal(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn always_backoff(_: &ServiceError) -> Verdict {
        Verdict::Backoff
    }

    fn by_status(err: &ServiceError) -> Verdict {
        match err.status() {
            Some(400) => Verdict::Skip,
            Some(401) => Verdict::RefreshThenRetry,
            Some(429) => Verdict::Wait(Duration::from_secs(3)),
            Some(503) => Verdict::Backoff,
            _ => Verdict::Fail,
        }
    }

    fn policy(classify: Classifier) -> RetryPolicy {
        RetryPolicy {
            name: "test",
            classify,
            max_attempts: 5,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(64),
            jitter: Duration::ZERO,
        }
    }

    struct CountingRefresh(AtomicU32);

    #[async_trait]
    impl CredentialRefresh for CountingRefresh {
        async fn refresh_credentials(&self) -> Result<(), ServiceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let p = policy(always_backoff);
        assert_eq!(p.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(p.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(p.backoff_delay(6), Duration::from_secs(64));
        assert_eq!(p.backoff_delay(40), Duration::from_secs(64));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let mut p = policy(always_backoff);
        p.jitter = Duration::from_secs(1);
        for _ in 0..50 {
            let d = p.backoff_delay(1);
            assert!(d >= Duration::from_secs(2) && d < Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_exhausts_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry(&policy(always_backoff), None, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::http("test", 503))
            }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 5, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_does_not_consume_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let started = tokio::time::Instant::now();
        let result = retry(&policy(by_status), None, || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 8 {
                    Err(ServiceError::http("test", 429))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 8);
        assert_eq!(started.elapsed(), Duration::from_secs(24));
    }

    #[tokio::test]
    async fn test_skip_and_fail_return_immediately() {
        let skipped: Result<(), _> = retry(&policy(by_status), None, || async {
            Err(ServiceError::http("test", 400))
        })
        .await;
        assert!(matches!(skipped, Err(RetryError::Skipped(_))));

        let fatal: Result<(), _> = retry(&policy(by_status), None, || async {
            Err(ServiceError::http("test", 418))
        })
        .await;
        assert!(matches!(fatal, Err(RetryError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_refresh_happens_once() {
        let refresher = CountingRefresh(AtomicU32::new(0));
        let result: Result<(), _> = retry(&policy(by_status), Some(&refresher), || async {
            Err(ServiceError::http("test", 401))
        })
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(refresher.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_then_success() {
        let refresher = CountingRefresh(AtomicU32::new(0));
        let calls = AtomicU32::new(0);
        let result = retry(&policy(by_status), Some(&refresher), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ServiceError::http("test", 401))
                } else {
                    Ok("rows")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "rows");
        assert_eq!(refresher.0.load(Ordering::SeqCst), 1);
    }
}
