//! Externally coordinated strategy
//!
//! Wraps a plain write (row lock or conditional update) in a lease named
//! after the record. The write only starts once the lease is held.
//!
//! # Lease Scope
//!
//! - [`LeaseScope::PerTransition`]: the lease covers a single write attempt.
//!   When the precondition is not met the lease is released before waiting,
//!   so the worker that has to move the record back is never locked out.
//! - [`LeaseScope::HoldUntilReleased`]: the lease is taken when the record
//!   leaves its rest state and kept until a transition returns it there,
//!   spanning the whole `available -> deleting -> available` cycle.
//!
//! Either way every lease is released exactly once: explicitly on the
//! normal path, by the guard's Drop on every other path. A worker that gives
//! up on moving the record back calls [`TransitionStrategy::abandon`], which
//! frees a held lease so the next cycle does not wait on it forever.

use crate::coordinator::{Lease, LeaseManager};
use crate::strategy::{AtomicWrite, PreconditionWait, TransitionStrategy};
use rowbench_core::{status, Result, RecordId, RetryCounters, Session, TransitionAttempt};
use serde::{Deserialize, Serialize};

/// How long a lease is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseScope {
    /// One write attempt
    #[default]
    PerTransition,
    /// From leaving the rest state until returning to it
    HoldUntilReleased,
}

/// Lease name for a record
pub fn lease_key(record: &RecordId) -> String {
    format!("record-{}", record)
}

/// A plain write guarded by a distributed lease
pub struct CoordinatedStrategy<W: AtomicWrite> {
    held: Option<Lease>,
    leases: LeaseManager,
    inner: W,
    scope: LeaseScope,
    wait: PreconditionWait,
    rest_state: String,
    name: String,
}

impl<W: AtomicWrite> CoordinatedStrategy<W> {
    /// Guard `inner` with leases from `leases`
    pub fn new(inner: W, leases: LeaseManager, scope: LeaseScope, wait: PreconditionWait) -> Self {
        let name = format!("coordinated({})", inner.name());
        Self {
            held: None,
            leases,
            inner,
            scope,
            wait,
            rest_state: status::AVAILABLE.to_string(),
            name,
        }
    }

    /// State that ends a hold-until-released window (default `available`)
    pub fn with_rest_state(mut self, state: impl Into<String>) -> Self {
        self.rest_state = state.into();
        self
    }

    /// Lease scope
    pub fn scope(&self) -> LeaseScope {
        self.scope
    }

    /// Lease manager
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Check if a hold-until-released lease is currently held
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    fn per_transition(
        &mut self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<()> {
        let key = lease_key(&attempt.record);
        let leases = &self.leases;
        let inner = &self.inner;

        self.wait.run(attempt, || {
            let lease = leases.lock(&key)?;
            leases.check()?;
            let outcome = inner.try_write(session, attempt, counters)?;
            if let Err(e) = lease.release() {
                // The write is committed; the transition stands.
                tracing::error!(key = %key, error = %e, "lease release failed after write");
            }
            Ok(outcome)
        })
    }

    fn hold_until_released(
        &mut self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<()> {
        let key = lease_key(&attempt.record);
        let leaving = attempt.initial == self.rest_state;
        let returning = attempt.destination == self.rest_state;

        if self.held.as_ref().map_or(false, |lease| lease.key() != key) {
            self.release_held();
        }
        if self.held.is_none() {
            self.held = Some(self.leases.lock(&key)?);
        }
        if leaving {
            if let Err(e) = self.leases.check() {
                self.release_held();
                return Err(e);
            }
        }

        let inner = &self.inner;
        let written = self
            .wait
            .run(attempt, || inner.try_write(session, attempt, counters));

        if let Err(e) = written {
            if leaving {
                self.release_held();
            }
            return Err(e);
        }
        if returning {
            self.release_held();
        }
        Ok(())
    }

    fn release_held(&mut self) {
        if let Some(lease) = self.held.take() {
            let key = lease.key().to_string();
            if let Err(e) = lease.release() {
                tracing::error!(key = %key, error = %e, "lease release failed");
            }
        }
    }
}

impl<W: AtomicWrite> TransitionStrategy for CoordinatedStrategy<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn transition_counted(
        &mut self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<()> {
        match self.scope {
            LeaseScope::PerTransition => self.per_transition(session, attempt, counters),
            LeaseScope::HoldUntilReleased => self.hold_until_released(session, attempt, counters),
        }
    }

    fn abandon(&mut self) {
        if self.held.is_some() {
            tracing::warn!(strategy = %self.name, "dropping held lease after an abandoned cycle");
        }
        self.release_held();
    }
}

impl<W: AtomicWrite> std::fmt::Debug for CoordinatedStrategy<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatedStrategy")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("holding", &self.held.is_some())
            .finish()
    }
}
