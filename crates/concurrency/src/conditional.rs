//! Optimistic conditional update strategy
//!
//! A single `UPDATE ... SET status, attach_status WHERE id = ? AND status = ?`.
//! The store's compare-and-set is the only mutual exclusion: zero affected
//! rows means another worker holds the record, and the write is tried again
//! after the precondition delay. Retrying on zero rows is always safe since
//! the statement changes nothing when its predicate fails.

use crate::retry::RetryPolicy;
use crate::strategy::{transition_with, AtomicWrite, PreconditionWait, TransitionStrategy, WriteOutcome};
use rowbench_core::{Field, Result, RetryCounters, Session, TransitionAttempt};

/// Compare-and-set update on the status column
#[derive(Debug, Clone, Default)]
pub struct ConditionalUpdateStrategy {
    policy: RetryPolicy,
    wait: PreconditionWait,
}

impl ConditionalUpdateStrategy {
    /// Create the strategy
    pub fn new(policy: RetryPolicy, wait: PreconditionWait) -> Self {
        Self { policy, wait }
    }
}

impl AtomicWrite for ConditionalUpdateStrategy {
    fn name(&self) -> &'static str {
        "update_with_where"
    }

    fn try_write(
        &self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<WriteOutcome> {
        let values = [
            (Field::Status, attempt.destination.clone()),
            (Field::AttachStatus, attempt.marker.clone()),
        ];
        let expected = [(Field::Status, attempt.initial.clone())];

        let affected = self.policy.run_counted(counters, || {
            session.update_where(&attempt.record, &values, &expected)
        })?;

        Ok(if affected == 0 {
            WriteOutcome::NotReady
        } else {
            WriteOutcome::Applied
        })
    }
}

impl TransitionStrategy for ConditionalUpdateStrategy {
    fn name(&self) -> &str {
        AtomicWrite::name(self)
    }

    fn transition_counted(
        &mut self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<()> {
        transition_with(&*self, &self.wait, session, attempt, counters)
    }
}
