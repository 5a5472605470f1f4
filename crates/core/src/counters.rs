//! Retry outcome counters
//!
//! One counter per [`RetryKind`]. Counters only ever grow: nested retry loops
//! inside one attempt add into the same instance, and merging two instances
//! sums them.

use crate::error::RetryKind;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Transient retries consumed by one attempt, by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounters {
    /// Lock wait timeouts retried
    pub lock_timeout: u32,
    /// Deadlocks retried
    pub deadlock: u32,
    /// Lost connections retried
    pub disconnect: u32,
}

impl RetryCounters {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one retry of the given kind
    pub fn record(&mut self, kind: RetryKind) {
        match kind {
            RetryKind::LockTimeout => self.lock_timeout += 1,
            RetryKind::Deadlock => self.deadlock += 1,
            RetryKind::Disconnect => self.disconnect += 1,
        }
    }

    /// Value of one counter
    pub fn get(&self, kind: RetryKind) -> u32 {
        match kind {
            RetryKind::LockTimeout => self.lock_timeout,
            RetryKind::Deadlock => self.deadlock,
            RetryKind::Disconnect => self.disconnect,
        }
    }

    /// Add another set of counters into this one
    pub fn merge(&mut self, other: &RetryCounters) {
        self.lock_timeout += other.lock_timeout;
        self.deadlock += other.deadlock;
        self.disconnect += other.disconnect;
    }

    /// Sum of all counters
    pub fn total(&self) -> u32 {
        self.lock_timeout + self.deadlock + self.disconnect
    }

    /// Check if no retry was recorded
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Iterate `(kind, count)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (RetryKind, u32)> + '_ {
        RetryKind::ALL.iter().map(move |k| (*k, self.get(*k)))
    }
}

impl AddAssign for RetryCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}
