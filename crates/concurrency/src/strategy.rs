//! State-transition strategies
//!
//! A strategy moves one record from an initial state to a destination
//! state, stamping a marker, and returns the transient retries it consumed.
//!
//! # Design
//!
//! Every strategy is split in two layers:
//!
//! - [`AtomicWrite`]: one attempt at the write. Either the write is applied,
//!   or the record is not in the initial state yet ([`WriteOutcome::NotReady`]).
//!   Transient store errors are absorbed by the [`RetryPolicy`] inside the
//!   attempt.
//! - [`TransitionStrategy`]: the full transition. Plain strategies loop the
//!   attempt through [`PreconditionWait`]; the coordinated strategy wraps the
//!   attempt in a lease first.
//!
//! A precondition-not-met result is a wait signal. It is never counted and
//! never becomes an error unless a wait cap is configured and exhausted.
//!
//! [`RetryPolicy`]: crate::RetryPolicy

use crate::conditional::ConditionalUpdateStrategy;
use crate::coordinated::{CoordinatedStrategy, LeaseScope};
use crate::coordinator::{CoordinatorService, LeaseConfig};
use crate::retry::RetryPolicy;
use crate::row_lock::RowLockStrategy;
use rowbench_core::{Error, Result, RetryCounters, Session, TransitionAttempt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Result of a single write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was moved to the destination state
    Applied,
    /// The record is not in the initial state yet
    NotReady,
}

/// One attempt at writing a transition
pub trait AtomicWrite: Send {
    /// Strategy name used in reports
    fn name(&self) -> &'static str;

    /// Try the write once, adding transient retries into `counters`
    fn try_write(
        &self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<WriteOutcome>;
}

/// A complete way of moving a record between two states
///
/// Instances are owned by one worker; they may keep state across calls
/// (a lease held over a whole cycle, for example).
pub trait TransitionStrategy: Send {
    /// Strategy name used in reports
    fn name(&self) -> &str;

    /// Move `attempt.record` from `attempt.initial` to `attempt.destination`,
    /// adding transient retries into `counters`
    ///
    /// Retries consumed before an error stay in `counters`.
    fn transition_counted(
        &mut self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
        counters: &mut RetryCounters,
    ) -> Result<()>;

    /// Move the record with fresh counters, returning them on success
    fn transition(
        &mut self,
        session: &mut dyn Session,
        attempt: &TransitionAttempt,
    ) -> Result<RetryCounters> {
        let mut counters = RetryCounters::new();
        self.transition_counted(session, attempt, &mut counters)?;
        Ok(counters)
    }

    /// Drop state kept across transitions once the caller gives up on a cycle
    fn abandon(&mut self) {}
}

/// Wait loop for a precondition that is not met yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionWait {
    delay: Duration,
    max_waits: Option<u32>,
}

impl PreconditionWait {
    /// Delay between checks unless configured otherwise
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);

    /// Unbounded waits with the default delay
    pub fn new() -> Self {
        Self {
            delay: Self::DEFAULT_DELAY,
            max_waits: None,
        }
    }

    /// Set the delay between checks
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Give up after `max` waits instead of waiting forever
    pub fn with_max_waits(mut self, max: u32) -> Self {
        self.max_waits = Some(max);
        self
    }

    /// Delay between checks
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait cap, `None` when unbounded
    pub fn max_waits(&self) -> Option<u32> {
        self.max_waits
    }

    /// Call `step` until it reports [`WriteOutcome::Applied`]
    ///
    /// Errors from `step` end the loop. Returns `PreconditionTimeout` when the
    /// wait cap is reached first.
    pub fn run(
        &self,
        attempt: &TransitionAttempt,
        mut step: impl FnMut() -> Result<WriteOutcome>,
    ) -> Result<()> {
        let mut waits = 0u32;
        loop {
            if step()? == WriteOutcome::Applied {
                return Ok(());
            }
            if let Some(max) = self.max_waits {
                if waits >= max {
                    return Err(Error::PreconditionTimeout {
                        record: attempt.record.clone(),
                        expected: attempt.initial.clone(),
                        waits,
                    });
                }
            }
            waits += 1;
            tracing::trace!(record = %attempt.record, expected = %attempt.initial, waits, "precondition not met");
            thread::sleep(self.delay);
        }
    }
}

impl Default for PreconditionWait {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive a plain write through the precondition wait loop
pub(crate) fn transition_with<W: AtomicWrite + ?Sized>(
    write: &W,
    wait: &PreconditionWait,
    session: &mut dyn Session,
    attempt: &TransitionAttempt,
    counters: &mut RetryCounters,
) -> Result<()> {
    wait.run(attempt, || write.try_write(session, attempt, counters))
}

/// Strategy selector used by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Pessimistic row lock
    ForUpdate,
    /// Optimistic conditional update
    UpdateWithWhere,
    /// Row lock behind a distributed lease
    CoordinatedForUpdate,
    /// Conditional update behind a distributed lease
    CoordinatedUpdateWithWhere,
}

impl StrategyKind {
    /// Every strategy, in report order
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::ForUpdate,
        StrategyKind::UpdateWithWhere,
        StrategyKind::CoordinatedForUpdate,
        StrategyKind::CoordinatedUpdateWithWhere,
    ];

    /// Name used in configuration and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::ForUpdate => "for_update",
            StrategyKind::UpdateWithWhere => "update_with_where",
            StrategyKind::CoordinatedForUpdate => "coordinated_for_update",
            StrategyKind::CoordinatedUpdateWithWhere => "coordinated_update_with_where",
        }
    }

    /// Check if this strategy needs a coordinator
    pub fn is_coordinated(&self) -> bool {
        matches!(
            self,
            StrategyKind::CoordinatedForUpdate | StrategyKind::CoordinatedUpdateWithWhere
        )
    }

    /// Parse a strategy name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds one strategy instance per worker
///
/// Coordinated strategies each get their own coordinator connection and
/// lease manager, so no lease state is shared between workers.
#[derive(Clone)]
pub struct StrategyFactory {
    kind: StrategyKind,
    policy: RetryPolicy,
    wait: PreconditionWait,
    coordinator: Option<CoordinatorService>,
    lease: LeaseConfig,
    scope: LeaseScope,
}

impl StrategyFactory {
    /// Factory for `kind` with default policies
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            policy: RetryPolicy::new(),
            wait: PreconditionWait::new(),
            coordinator: None,
            lease: LeaseConfig::default(),
            scope: LeaseScope::default(),
        }
    }

    /// Set the transient retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the precondition wait loop
    pub fn precondition_wait(mut self, wait: PreconditionWait) -> Self {
        self.wait = wait;
        self
    }

    /// Set the coordination service used by coordinated strategies
    pub fn coordinator(mut self, service: CoordinatorService) -> Self {
        self.coordinator = Some(service);
        self
    }

    /// Set lease timing
    pub fn lease_config(mut self, lease: LeaseConfig) -> Self {
        self.lease = lease;
        self
    }

    /// Set lease scope
    pub fn lease_scope(mut self, scope: LeaseScope) -> Self {
        self.scope = scope;
        self
    }

    /// Strategy kind this factory builds
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Build a fresh strategy instance
    pub fn build(&self) -> Result<Box<dyn TransitionStrategy>> {
        let row_lock = || RowLockStrategy::new(self.policy.clone(), self.wait.clone());
        let conditional = || ConditionalUpdateStrategy::new(self.policy.clone(), self.wait.clone());

        Ok(match self.kind {
            StrategyKind::ForUpdate => Box::new(row_lock()),
            StrategyKind::UpdateWithWhere => Box::new(conditional()),
            StrategyKind::CoordinatedForUpdate => Box::new(CoordinatedStrategy::new(
                row_lock(),
                self.lease_manager()?,
                self.scope,
                self.wait.clone(),
            )),
            StrategyKind::CoordinatedUpdateWithWhere => Box::new(CoordinatedStrategy::new(
                conditional(),
                self.lease_manager()?,
                self.scope,
                self.wait.clone(),
            )),
        })
    }

    fn lease_manager(&self) -> Result<crate::LeaseManager> {
        let service = self.coordinator.as_ref().ok_or_else(|| {
            Error::InvalidConfig(format!("strategy {} needs a coordinator", self.kind))
        })?;
        crate::LeaseManager::new(service.connect()?, self.lease.clone())
    }
}

impl fmt::Debug for StrategyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyFactory")
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .field("wait", &self.wait)
            .field("coordinator", &self.coordinator.as_ref().map(|c| c.backend()))
            .field("scope", &self.scope)
            .finish()
    }
}
