//! Pessimistic row lock strategy
//!
//! `BEGIN; SELECT ... FOR UPDATE; UPDATE ...; COMMIT`. The row lock is held
//! from the locking read to the commit, so the state check and the write
//! see the same image. A state mismatch rolls back and reports
//! [`WriteOutcome::NotReady`].
//!
//! A deadlock or lock wait timeout aborts the transaction on the server, so
//! the retry policy re-runs the whole read-lock-write sequence, never just
//! the failed statement.

use crate::retry::RetryPolicy;
use crate::strategy::{transition_with, AtomicWrite, PreconditionWait, TransitionStrategy, WriteOutcome};
use rowbench_core::{Error, Field, Result, RetryCounters, Session, TransitionAttempt};

/// `SELECT ... FOR UPDATE` then write, inside one transaction
#[derive(Debug, Clone, Default)]
pub struct RowLockStrategy {
    policy: RetryPolicy,
    wait: PreconditionWait,
}

impl RowLockStrategy {
    /// Create the strategy
    pub fn new(policy: RetryPolicy, wait: PreconditionWait) -> Self {
        Self { policy, wait }
    }

    /// One read-lock-write transaction, without retries
    fn locked_write(session: &mut dyn Session, attempt: &TransitionAttempt) -> Result<WriteOutcome> {
        if session.in_transaction() {
            session.rollback()?;
        }
        session.begin()?;

        match Self::check_and_write(session, attempt) {
            Ok(WriteOutcome::Applied) => {
                session.commit()?;
                Ok(WriteOutcome::Applied)
            }
            Ok(WriteOutcome::NotReady) => {
                session.rollback()?;
                Ok(WriteOutcome::NotReady)
            }
            Err(e) => {
                if let Err(rollback) = session.rollback() {
                    tracing::debug!(error = %rollback, "rollback after failed write");
                }
                Err(e)
            }
        }
    }

    fn check_and_write(session: &mut dyn Session, attempt: &TransitionAttempt) -> Result<WriteOutcome> {
        let current = session
            .select_for_update(&attempt.record)?
            .ok_or_else(|| Error::NotFound {
                record: attempt.record.clone(),
                location: session.replica().to_string(),
            })?;

        if current.status != attempt.initial {
            return Ok(WriteOutcome::NotReady);
        }

        let values = [
            (Field::Status, attempt.destination.clone()),
            (Field::AttachStatus, attempt.marker.clone()),
        ];
        session.update_where(&attempt.record, &values, &[])?;
        Ok(WriteOutcome::Applied)
    }
}

impl AtomicWrite for RowLockStrategy {
    fn name(&self) -> &'static str {
        "for_update"
    }

    fn try_write(
        &self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<WriteOutcome> {
        self.policy
            .run_counted(counters, || Self::locked_write(session, attempt))
    }
}

impl TransitionStrategy for RowLockStrategy {
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
