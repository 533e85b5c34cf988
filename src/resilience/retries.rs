//! Retry logic.
//!
//! # Responsibilities
//! - Bound the number of attempts for one forward
//! - Give every attempt its own deadline
//! - Classify failures as retryable or terminal
//! - Optionally space attempts with jittered backoff
//!
//! # Design Decisions
//! - The policy knows nothing about HTTP; callers supply the attempt as a
//!   closure and the error type decides whether it is worth repeating
//! - Upstream status codes are not errors here, so a 5xx is never retried
//! - Exhausting the budget is reported as an explicit error carrying the
//!   last failure, never swallowed

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::{RetryConfig, TimeoutConfig};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::{with_deadline, AttemptTimeout};

/// Failure classification used by [`RetryPolicy`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Terminal result of a retried operation that never succeeded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// An attempt failed in a way that repeating cannot fix.
    #[error("attempt {attempts} failed permanently: {error}")]
    Aborted { attempts: u32, error: E },
}

/// Bounded retry policy: attempt cap, per-attempt deadline, optional backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    attempt_timeout: Duration,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy with no delay between attempts.
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn from_config(retries: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self::new(retries.max_attempts, timeouts.attempt())
            .with_backoff(retries.base_delay_ms, retries.max_delay_ms)
    }

    /// Space attempts with exponential backoff starting at `base_ms`.
    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_delay_ms = base_ms;
        self.max_delay_ms = max_ms;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Drive `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. An attempt that overruns the
    /// deadline is dropped and surfaces as `E::from(AttemptTimeout)`.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + From<AttemptTimeout> + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = match with_deadline(self.attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(elapsed) => Err(E::from(elapsed)),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(RetryError::Aborted { attempts: attempt, error });
            }

            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted { attempts: attempt, last: error });
            }

            let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay = ?delay,
                error = %error,
                "Attempt failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
