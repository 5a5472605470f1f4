//! Retry policy for transient store errors
//!
//! The policy wraps an operation closure. Errors the store classifies as
//! transient (lock wait timeout, deadlock, lost connection) are counted by
//! kind and the operation is re-run after a fixed delay. Anything else,
//! including domain errors such as a consistency mismatch, is returned
//! immediately.
//!
//! Counters are accumulated into a caller-provided [`RetryCounters`] so that
//! nested loops inside one attempt add up instead of overwriting each other.

use rowbench_core::{Error, Result, RetryCounters};
use std::thread;
use std::time::Duration;

/// Operation outcome together with the retries it consumed
#[derive(Debug)]
pub struct Retried<T> {
    /// Outcome of the last run of the operation
    pub result: Result<T>,
    /// Transient retries consumed, by kind
    pub counters: RetryCounters,
}

/// Retry loop configuration
///
/// # Example
///
/// ```
/// use rowbench_concurrency::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new().with_delay(Duration::from_millis(5)).with_max_retries(100);
/// let retried = policy.run(|| Ok::<_, rowbench_core::Error>(42));
/// assert_eq!(retried.result.unwrap(), 42);
/// assert!(retried.counters.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
    max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Delay between retries unless configured otherwise
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);

    /// Unbounded retries with the default delay
    pub fn new() -> Self {
        Self {
            delay: Self::DEFAULT_DELAY,
            max_retries: None,
        }
    }

    /// Set the delay between retries
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cap the number of retries; the default is unbounded
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Delay between retries
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Retry cap, `None` when unbounded
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Run `op` with fresh counters, returning outcome and counters together
    pub fn run<T>(&self, op: impl FnMut() -> Result<T>) -> Retried<T> {
        let mut counters = RetryCounters::new();
        let result = self.run_counted(&mut counters, op);
        Retried { result, counters }
    }

    /// Run `op`, adding consumed retries into `counters`
    pub fn run_counted<T>(
        &self,
        counters: &mut RetryCounters,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut retries = 0u32;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let Some(kind) = err.retry_kind() else {
                return Err(err);
            };

            if let Some(max) = self.max_retries {
                if retries >= max {
                    return Err(match err {
                        Error::Store(last) => Error::RetriesExhausted { retries, last },
                        other => other,
                    });
                }
            }

            counters.record(kind);
            retries += 1;
            tracing::debug!(kind = %kind, retries, error = %err, "transient store error, retrying");

            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
