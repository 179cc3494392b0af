//! Conflict-retrying transaction executor.
//!
//! Runs a unit of work inside a transaction and restarts it from scratch when
//! the store reports a transient conflict. Attempts are bounded by
//! [`RetryPolicy`]: a maximum attempt count, exponential backoff with jitter
//! between attempts, and an overall deadline.

use std::time::{Duration, Instant};

use rand::Rng;

use super::{TransactionalStore, TxMode};
use crate::{AppError, Result};

/// Bounds on conflict retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Backoff before the second attempt
    pub base_delay: Duration,
    /// Upper bound for a single backoff
    pub max_delay: Duration,
    /// Give up once this much time has passed since the first attempt
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt number `attempt` (1-based).
    ///
    /// Exponential in the attempt number, capped at `max_delay`, with the
    /// upper half of the interval randomized.
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);

        let half = ceiling / 2;
        let jitter_ms = (ceiling - half).as_millis() as u64;
        if jitter_ms == 0 {
            return ceiling;
        }
        half + Duration::from_millis(rng.gen_range(0..=jitter_ms))
    }
}

/// Executes units of work with bounded conflict retries.
#[derive(Debug, Clone, Default)]
pub struct ConflictRetryExecutor {
    policy: RetryPolicy,
}

impl ConflictRetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `work` in a transaction on `store`, retrying transient conflicts.
    ///
    /// `work` is invoked once per attempt against that attempt's handle, so it
    /// must not carry side effects outside the transaction. Non-transient
    /// errors are returned unchanged; running out of attempts (or time)
    /// returns [`AppError::RetriesExhausted`] wrapping the last conflict.
    pub fn run<S, T, F>(&self, store: &S, mode: TxMode, mut work: F) -> Result<T>
    where
        S: TransactionalStore,
        F: FnMut(&S::Handle) -> Result<T>,
    {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match store.execute_in_transaction(mode, |handle| work(handle)) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("Transaction committed after {} attempts", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            if attempt >= max_attempts {
                tracing::warn!("Giving up after {} conflicting attempts: {}", attempt, err);
                return Err(AppError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.policy.backoff(attempt, &mut rand::thread_rng());
            if let Some(deadline) = self.policy.deadline {
                if started.elapsed() + delay > deadline {
                    tracing::warn!(
                        "Transaction deadline of {:?} reached after {} attempts: {}",
                        deadline,
                        attempt,
                        err
                    );
                    return Err(AppError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
            }

            tracing::debug!(
                "Transient conflict on attempt {}, retrying in {:?}: {}",
                attempt,
                delay,
                err
            );
            std::thread::sleep(delay);
        }
    }
}
