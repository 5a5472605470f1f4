//! Fault injection
//!
//! Tests and chaos runs arm rules of the form "the next N statements of this
//! kind fail with this error". Rules are consumed in arming order.

use parking_lot::Mutex;
use rowbench_core::StoreError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statement kinds a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `BEGIN`
    Begin,
    /// Plain read
    Get,
    /// `SELECT ... FOR UPDATE`
    SelectForUpdate,
    /// `UPDATE ... WHERE`
    UpdateWhere,
    /// `INSERT`
    Insert,
    /// `DELETE`
    Delete,
    /// `COMMIT`
    Commit,
    /// Any statement
    Any,
}

#[derive(Debug)]
struct FaultRule {
    point: FaultPoint,
    error: StoreError,
    remaining: u32,
}

/// Armed fault rules shared by every session of a cluster
#[derive(Debug, Default)]
pub struct FaultInjector {
    rules: Mutex<Vec<FaultRule>>,
    fired: AtomicU64,
}

impl FaultInjector {
    /// Create an injector with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` statements matching `point` fail with `error`
    pub fn inject(&self, point: FaultPoint, error: StoreError, times: u32) {
        if times == 0 {
            return;
        }
        self.rules.lock().push(FaultRule {
            point,
            error,
            remaining: times,
        });
    }

    /// Consume a matching rule for a statement about to run
    pub fn check(&self, point: FaultPoint) -> Result<(), StoreError> {
        let mut rules = self.rules.lock();
        let idx = rules
            .iter()
            .position(|r| r.point == point || r.point == FaultPoint::Any);
        let Some(idx) = idx else {
            return Ok(());
        };

        let error = rules[idx].error.clone();
        rules[idx].remaining -= 1;
        if rules[idx].remaining == 0 {
            rules.remove(idx);
        }
        self.fired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(?point, code = error.code, "injected fault");
        Err(error)
    }

    /// Number of faults fired so far
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    /// Number of faults still armed
    pub fn pending(&self) -> u32 {
        self.rules.lock().iter().map(|r| r.remaining).sum()
    }

    /// Disarm every rule
    pub fn clear(&self) {
        self.rules.lock().clear();
    }
}
