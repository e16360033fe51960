//! Bounded retry around a whole unit of work.
//!
//! A failed attempt is retried from the start, never resumed. Errors whose
//! code is in the policy's non-retryable set are returned straight away.
//!
//! # Backoff
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! A zero `base_delay` disables waiting (and jitter) entirely.

use crate::errors::{CaptureError, ErrorCode};
use rand::{Rng, rng};
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    max_retries: usize,
    non_retryable: HashSet<ErrorCode>,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// Policy that never retries business errors and backs off from 1 second.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            non_retryable: ErrorCode::BUSINESS.into_iter().collect(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn is_retryable(&self, error: &CaptureError) -> bool {
        !self.non_retryable.contains(&error.code())
    }

    fn backoff(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let delay = self
            .base_delay
            .saturating_mul(1 << shift)
            .min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }

    /// Run `unit` until it succeeds, fails with a non-retryable error, or
    /// has failed `max_retries + 1` times.
    ///
    /// Each retry re-runs the whole unit after a [`backoff`](Self::backoff)
    /// sleep; nothing is resumed from a failed attempt.
    ///
    /// # Arguments
    ///
    /// * `operation` - Name used in retry log lines
    /// * `unit` - Produces a fresh attempt each time it is called
    ///
    /// # Returns
    ///
    /// The first successful result, or the error of the last attempt.
    /// Business errors are returned from the attempt that raised them.
    #[instrument(level = "info", skip(self, unit))]
    pub async fn run<T, F, Fut>(&self, operation: &str, mut unit: F) -> Result<T, CaptureError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CaptureError>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let e = match unit().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !self.is_retryable(&e) {
                warn!(code = %e.code(), error = %e, "Non-retryable failure");
                return Err(e);
            }
            if attempt >= self.max_retries {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %e,
                    "Retries exhausted"
                );
                return Err(e);
            }
            attempt += 1;
            let delay = self.backoff(attempt);
            warn!(
                attempt,
                max = self.max_retries,
                ?delay,
                error = %e,
                "Attempt failed; retrying"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(max_retries).with_base_delay(Duration::ZERO)
    }

    fn transient() -> CaptureError {
        CaptureError::Extraction("node detached".to_string())
    }

    #[tokio::test]
    async fn test_fails_n_times_then_succeeds() {
        for n in 0..4 {
            let calls = &Cell::new(0usize);
            let result = policy(n)
                .run("flaky", move || async move {
                    calls.set(calls.get() + 1);
                    if calls.get() <= n { Err(transient()) } else { Ok(calls.get()) }
                })
                .await;
            assert_eq!(result.unwrap(), n + 1);
            assert_eq!(calls.get(), n + 1);
        }
    }

    #[tokio::test]
    async fn test_business_error_is_not_retried() {
        let calls = &Cell::new(0usize);
        let err = policy(5)
            .run("invalid", move || async move {
                calls.set(calls.get() + 1);
                Err::<(), _>(CaptureError::InvalidInput("Missing keys in payload: search_phrase".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidInput(_)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_raises_first_failure() {
        let calls = &Cell::new(0usize);
        let err = policy(0)
            .run("once", move || async move {
                calls.set(calls.get() + 1);
                Err::<(), _>(transient())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Extraction(_)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let calls = &Cell::new(0usize);
        let err = policy(2)
            .run("always", move || async move {
                calls.set(calls.get() + 1);
                Err::<(), _>(CaptureError::Unexpected(format!("attempt {}", calls.get())))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(err.to_string(), "Unexpected error: attempt 3");
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10);
        let delay = policy.backoff(10);
        assert!(delay >= Duration::from_secs(30));
        assert!(delay <= Duration::from_millis(30_250));
        assert_eq!(RetryPolicy::new(1).with_base_delay(Duration::ZERO).backoff(1), Duration::ZERO);
    }
}
