//! Transition worker
//!
//! One iteration is one measured cycle on the worker's record:
//!
//! ```text
//! 1. available -> deleting, marker "{worker}_{iteration}"   (timed: acquire)
//! 2. every replica reports (deleting, marker)               (checker)
//! 3. deleting -> available, same marker                     (timed: release)
//! 4. emit a ResultDataPoint
//! ```
//!
//! A failed step 1 ends the iteration: the record was not moved. Once step 1
//! succeeded, step 3 always runs, so the record is never left in the
//! intermediate state; a mismatch from step 2 is recorded as the iteration's
//! failure after the record has been put back. Errors from step 2 that are
//! not mismatches are kept as a non-fatal `check_error`.

use crate::checker::{CheckPolicy, ConsistencyChecker};
use crate::harness::ApplyOverride;
use chrono::Utc;
use rowbench_concurrency::{StrategyFactory, TransitionStrategy};
use rowbench_core::{
    status, Connector, Error, Outcome, RecordId, Result, ResultDataPoint, RetryCounters, Session,
    TransitionAttempt,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Parameters of one transition worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerParams {
    /// Cycles to run
    pub iterations: usize,
    /// Index into the seeded record list
    pub record_index: usize,
    /// Capture per-call samples for every cycle
    pub profile: bool,
    /// Attempts at the release transition before giving up on it
    pub release_attempts: u32,
}

impl Default for WorkerParams {
    fn default() -> Self {
        Self {
            iterations: 10,
            record_index: 0,
            profile: false,
            release_attempts: 10,
        }
    }
}

/// Per-worker overrides of [`WorkerParams`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOverrides {
    /// Cycles to run
    pub iterations: Option<usize>,
    /// Index into the seeded record list
    pub record_index: Option<usize>,
    /// Capture per-call samples
    pub profile: Option<bool>,
}

impl ApplyOverride<WorkerOverrides> for WorkerParams {
    fn apply_override(&mut self, overrides: WorkerOverrides) {
        if let Some(iterations) = overrides.iterations {
            self.iterations = iterations;
        }
        if let Some(index) = overrides.record_index {
            self.record_index = index;
        }
        if let Some(profile) = overrides.profile {
            self.profile = profile;
        }
    }
}

const RELEASE_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Everything a worker thread needs to run its cycles
///
/// Cheap to share: each call to [`TransitionWorker::run`] opens its own
/// session, checker sessions and strategy instance.
#[derive(Clone)]
pub struct TransitionWorker {
    connector: Arc<dyn Connector>,
    factory: StrategyFactory,
    check: CheckPolicy,
    records: Arc<Vec<RecordId>>,
}

impl TransitionWorker {
    /// Create a worker template
    pub fn new(
        connector: Arc<dyn Connector>,
        factory: StrategyFactory,
        check: CheckPolicy,
        records: Vec<RecordId>,
    ) -> Self {
        Self {
            connector,
            factory,
            check,
            records: Arc::new(records),
        }
    }

    /// Open connections and run every cycle for worker `id`
    pub fn run(&self, id: usize, params: WorkerParams) -> Result<Vec<ResultDataPoint>> {
        if self.records.is_empty() {
            return Err(Error::InvalidConfig("no records to work on".into()));
        }
        let record = self.records[params.record_index % self.records.len()].clone();
        let mut session = self.connector.connect()?;
        let mut checker = ConsistencyChecker::connect(self.connector.as_ref(), self.check.clone())?;
        let mut strategy = self.factory.build()?;

        tracing::debug!(worker = id, record = %record, strategy = strategy.name(), "worker started");
        Ok(run_cycles(
            id,
            &params,
            &record,
            session.as_mut(),
            strategy.as_mut(),
            &mut checker,
        ))
    }
}

impl std::fmt::Debug for TransitionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionWorker")
            .field("factory", &self.factory)
            .field("check", &self.check)
            .field("records", &self.records.len())
            .finish()
    }
}

/// Run `params.iterations` cycles on `record`
pub fn run_cycles(
    worker: usize,
    params: &WorkerParams,
    record: &RecordId,
    session: &mut dyn Session,
    strategy: &mut dyn TransitionStrategy,
    checker: &mut ConsistencyChecker,
) -> Vec<ResultDataPoint> {
    let mut points = Vec::with_capacity(params.iterations);
    for sequence in 0..params.iterations {
        points.push(run_cycle(worker, sequence, params, record, session, strategy, checker));
    }
    points
}

fn run_cycle(
    worker: usize,
    sequence: usize,
    params: &WorkerParams,
    record: &RecordId,
    session: &mut dyn Session,
    strategy: &mut dyn TransitionStrategy,
    checker: &mut ConsistencyChecker,
) -> ResultDataPoint {
    let started_at = Utc::now();
    let attempt = TransitionAttempt::new(
        record.clone(),
        status::AVAILABLE,
        status::DELETING,
        TransitionAttempt::marker_for(worker, sequence),
    );
    if params.profile {
        session.take_call_samples();
    }

    // One accumulator for the whole point: retries from failed attempts count too.
    let mut counters = RetryCounters::new();
    let started = Instant::now();
    if let Err(e) = strategy.transition_counted(session, &attempt, &mut counters) {
        tracing::warn!(worker, sequence, record = %record, error = %e, "acquire transition failed");
        let mut point = ResultDataPoint::failed(worker, sequence, started_at, e.to_string());
        point.counters = counters;
        return point;
    }
    let mut point = ResultDataPoint::ok(worker, sequence, started_at);
    point.acquire = started.elapsed();

    let mut failure = None;
    match checker.verify_with_retry(record, &attempt.expected_after()) {
        Ok(()) => {}
        Err(e) if e.is_wrong_data() => failure = Some(e.to_string()),
        Err(e) => point.check_error = Some(e.to_string()),
    }

    let started = Instant::now();
    let reversed = attempt.reversed();
    match release(worker, params.release_attempts, session, strategy, &reversed, &mut counters) {
        Ok(()) => point.release = started.elapsed(),
        Err(e) => {
            failure.get_or_insert_with(|| format!("release failed: {}", e));
        }
    }
    point.counters = counters;

    if params.profile {
        point.profile = Some(session.take_call_samples());
    }
    if let Some(reason) = failure {
        tracing::warn!(worker, sequence, record = %record, reason = %reason, "cycle failed");
        point.outcome = Outcome::Failed(reason);
    }
    point
}

/// Move the record back, retrying errors the strategy did not absorb
///
/// When every attempt failed the strategy is told to abandon the cycle.
fn release(
    worker: usize,
    attempts: u32,
    session: &mut dyn Session,
    strategy: &mut dyn TransitionStrategy,
    attempt: &TransitionAttempt,
    counters: &mut RetryCounters,
) -> Result<()> {
    let attempts = attempts.max(1);
    let mut tried = 0;
    loop {
        tried += 1;
        match strategy.transition_counted(session, attempt, counters) {
            Ok(()) => return Ok(()),
            Err(e) if tried >= attempts => {
                tracing::error!(worker, record = %attempt.record, attempts = tried, error = %e, "giving up on release transition");
                strategy.abandon();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(worker, record = %attempt.record, attempt = tried, error = %e, "release transition failed, retrying");
                thread::sleep(RELEASE_RETRY_DELAY);
            }
        }
    }
}
