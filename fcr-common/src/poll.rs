//! Eventual-assertion polling.
//!
//! The same predicate serves as liveness probe and final oracle: it is
//! re-evaluated until it passes or the deadline expires, and on expiry the
//! last captured failure is surfaced rather than a bare "timed out".

use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::errors::{HarnessError, HarnessResult, RetryableError};

/// Default bound for a single poll, matching the upstream test suite.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause between evaluations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a bounded-retry predicate evaluation.
#[derive(Debug)]
pub enum PollResult<T> {
    Success(T),
    TimedOut {
        last_error: HarnessError,
        attempts: u32,
        elapsed: Duration,
    },
    PredicateFailed(HarnessError),
}

impl<T> PollResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a harness result; a timeout keeps the last failure as its cause.
    pub fn into_result(self, what: &str) -> HarnessResult<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::TimedOut {
                last_error,
                attempts,
                elapsed,
            } => Err(HarnessError::PollTimeout {
                what: what.to_string(),
                attempts,
                elapsed,
                last: Box::new(last_error),
            }),
            Self::PredicateFailed(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Re-evaluate `predicate` until it succeeds, fails non-retryably, or the deadline passes.
    ///
    /// A final attempt is always made at the deadline, so a condition that
    /// becomes true just before expiry is still observed.
    pub fn await_condition<T, F>(&self, what: &str, mut predicate: F) -> PollResult<T>
    where
        F: FnMut() -> HarnessResult<T>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match predicate() {
                Ok(value) => {
                    if attempts > 1 {
                        info!(what, attempts, elapsed_ms = started.elapsed().as_millis() as u64, "condition met");
                    } else {
                        debug!(what, "condition met on first attempt");
                    }
                    return PollResult::Success(value);
                }
                Err(err) if err.is_retryable() => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(what, attempts, error = %err, "condition did not converge before deadline");
                        return PollResult::TimedOut {
                            last_error: err,
                            attempts,
                            elapsed: started.elapsed(),
                        };
                    }
                    debug!(what, attempts, error = %err, "condition not met yet, retrying");
                    sleep(self.interval.min(deadline - now));
                }
                Err(err) => {
                    warn!(what, attempts, error = %err, "condition check failed (non-retryable)");
                    return PollResult::PredicateFailed(err);
                }
            }
        }
    }

    /// [`Self::await_condition`] folded into a harness result.
    pub fn until<T, F>(&self, what: &str, predicate: F) -> HarnessResult<T>
    where
        F: FnMut() -> HarnessResult<T>,
    {
        self.await_condition(what, predicate).into_result(what)
    }
}
