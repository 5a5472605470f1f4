//! Row lock table
//!
//! Exclusive per-row locks owned by a session id. A session waiting for a
//! row held by someone else blocks on a condvar until the row is released or
//! the lock-wait timeout expires, in which case the store reports
//! `Lock wait timeout exceeded`.

use parking_lot::{Condvar, Mutex};
use rowbench_core::{RecordId, StoreError};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Exclusive row locks keyed by record id
#[derive(Debug, Default)]
pub struct LockTable {
    owners: Mutex<HashMap<RecordId, u64>>,
    released: Condvar,
}

impl LockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock on `id` for `session`, waiting at most `timeout`
    ///
    /// Re-acquiring a lock already held by the same session succeeds
    /// immediately.
    pub fn acquire(&self, id: &RecordId, session: u64, timeout: Duration) -> Result<(), StoreError> {
        // A timeout past the end of the clock means no timeout.
        let deadline = Instant::now().checked_add(timeout);
        let mut owners = self.owners.lock();
        loop {
            match owners.get(id) {
                None => {
                    owners.insert(id.clone(), session);
                    return Ok(());
                }
                Some(owner) if *owner == session => return Ok(()),
                Some(_) => {
                    let Some(deadline) = deadline else {
                        self.released.wait(&mut owners);
                        continue;
                    };
                    if self.released.wait_until(&mut owners, deadline).timed_out() {
                        // One last look: the row may have been freed right at the deadline
                        if !owners.contains_key(id) {
                            owners.insert(id.clone(), session);
                            return Ok(());
                        }
                        return Err(StoreError::lock_wait_timeout());
                    }
                }
            }
        }
    }

    /// Release every lock in `ids` held by `session`
    pub fn release(&self, ids: &[RecordId], session: u64) {
        if ids.is_empty() {
            return;
        }
        let mut owners = self.owners.lock();
        for id in ids {
            if owners.get(id) == Some(&session) {
                owners.remove(id);
            }
        }
        drop(owners);
        self.released.notify_all();
    }

    /// Session currently holding the lock on `id`
    pub fn owner(&self, id: &RecordId) -> Option<u64> {
        self.owners.lock().get(id).copied()
    }

    /// Number of rows currently locked
    pub fn held(&self) -> usize {
        self.owners.lock().len()
    }
}
