//! Cross-replica consistency checker
//!
//! After a successful transition every replica must eventually report the
//! destination state and the attempt's marker. The checker holds one
//! session per replica and reads each one directly, so a value that has not
//! replicated yet shows up as a [`Error::WrongData`] naming the replica.
//!
//! Replication lag is absorbed by [`ConsistencyChecker::verify_with_retry`]:
//! a mismatch is retried with a growing backoff (`step * attempt`). Other
//! errors are retried immediately under their own cap; they do not consume
//! the mismatch budget.

use rowbench_core::{Connector, Error, ExpectedFields, RecordId, ReplicaId, Result, Session};
use std::thread;
use std::time::Duration;

/// Retry budget of the checker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPolicy {
    /// Attempts allowed for mismatches, and separately for other errors
    pub attempts: u32,
    /// Backoff unit: the n-th mismatch sleeps `n * backoff_step`
    pub backoff_step: Duration,
}

impl CheckPolicy {
    /// Sleep after the `failures`-th mismatch (1-based)
    pub fn backoff(&self, failures: u32) -> Duration {
        self.backoff_step * failures
    }
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            backoff_step: Duration::from_millis(250),
        }
    }
}

/// Reads a record from every replica and compares fields
pub struct ConsistencyChecker {
    sessions: Vec<Box<dyn Session>>,
    policy: CheckPolicy,
}

impl ConsistencyChecker {
    /// Open one session per replica reachable through `connector`
    pub fn connect(connector: &dyn Connector, policy: CheckPolicy) -> Result<Self> {
        let sessions = connector
            .replicas()
            .into_iter()
            .map(|replica| connector.connect_replica(replica))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_sessions(sessions, policy))
    }

    /// Use already opened replica sessions
    pub fn from_sessions(sessions: Vec<Box<dyn Session>>, policy: CheckPolicy) -> Self {
        Self { sessions, policy }
    }

    /// Replicas checked, in order
    pub fn replicas(&self) -> Vec<ReplicaId> {
        self.sessions.iter().map(|s| s.replica()).collect()
    }

    /// Retry budget
    pub fn policy(&self) -> &CheckPolicy {
        &self.policy
    }

    /// Compare every expected field on every replica, once
    pub fn verify(&mut self, record: &RecordId, expected: &ExpectedFields) -> Result<()> {
        for session in self.sessions.iter_mut() {
            let replica = session.replica();
            let found = session.get(record)?.ok_or_else(|| Error::NotFound {
                record: record.clone(),
                location: replica.to_string(),
            })?;

            for (field, value) in expected.iter() {
                let actual = found.field(*field).unwrap_or_default();
                if actual != value {
                    return Err(Error::WrongData {
                        replica: replica.to_string(),
                        record: record.clone(),
                        field: *field,
                        expected: value.clone(),
                        actual: actual.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Verify, retrying mismatches with backoff
    pub fn verify_with_retry(&mut self, record: &RecordId, expected: &ExpectedFields) -> Result<()> {
        let attempts = self.policy.attempts.max(1);
        let mut mismatches = 0u32;
        let mut others = 0u32;

        loop {
            let err = match self.verify(record, expected) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if err.is_wrong_data() {
                mismatches += 1;
                if mismatches >= attempts {
                    tracing::error!(record = %record, attempts = mismatches, error = %err, "replicas did not converge");
                    return Err(err);
                }
                let backoff = self.policy.backoff(mismatches);
                tracing::debug!(record = %record, attempt = mismatches, ?backoff, error = %err, "check mismatch, retrying");
                thread::sleep(backoff);
            } else {
                others += 1;
                if others >= attempts {
                    tracing::error!(record = %record, attempts = others, error = %err, "check failed");
                    return Err(err);
                }
                tracing::warn!(record = %record, attempt = others, error = %err, "check error, retrying");
            }
        }
    }
}

impl std::fmt::Debug for ConsistencyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyChecker")
            .field("replicas", &self.replicas())
            .field("policy", &self.policy)
            .finish()
    }
}
