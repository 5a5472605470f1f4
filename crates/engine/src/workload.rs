//! Synthetic background load
//!
//! Each load worker inserts one private record, then loops a fixed mix of
//! point reads and single-field updates on it until the shared stop flag is
//! raised, and finally deletes the record. The flag is polled once per
//! cycle. Operations are spread evenly over `cycle_time`, so the load rate
//! is `(selects + updates) / cycle_time` per worker.
//!
//! Load workers never touch the records the transition workers contend on.

use crate::harness::{ApplyOverride, Harness, Overrides};
use rowbench_concurrency::RetryPolicy;
use rowbench_core::{
    status, Connector, Error, Field, Record, RecordId, Result, RetryCounters, Session,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Parameters of one load worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadParams {
    /// Point reads per cycle
    pub selects: u32,
    /// Updates per cycle
    pub updates: u32,
    /// Duration of one cycle, spread evenly over its operations
    pub cycle_time_ms: u64,
}

impl LoadParams {
    /// Sleep after each operation
    pub fn operation_delay(&self) -> Duration {
        let operations = (self.selects + self.updates).max(1);
        Duration::from_millis(self.cycle_time_ms) / operations
    }
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            selects: 10,
            updates: 5,
            cycle_time_ms: 1000,
        }
    }
}

/// Per-worker overrides of [`LoadParams`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOverrides {
    /// Point reads per cycle
    pub selects: Option<u32>,
    /// Updates per cycle
    pub updates: Option<u32>,
    /// Duration of one cycle
    pub cycle_time_ms: Option<u64>,
}

impl ApplyOverride<LoadOverrides> for LoadParams {
    fn apply_override(&mut self, overrides: LoadOverrides) {
        if let Some(selects) = overrides.selects {
            self.selects = selects;
        }
        if let Some(updates) = overrides.updates {
            self.updates = updates;
        }
        if let Some(ms) = overrides.cycle_time_ms {
            self.cycle_time_ms = ms;
        }
    }
}

/// What one load worker did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Worker id
    pub worker: usize,
    /// Private record used by the worker
    pub record: RecordId,
    /// Completed cycles
    pub cycles: u64,
    /// Point reads issued
    pub selects: u64,
    /// Updates issued
    pub updates: u64,
    /// Transient retries consumed
    pub counters: RetryCounters,
}

/// Starts background load workers
#[derive(Clone)]
pub struct LoadGenerator {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    defaults: LoadParams,
}

impl LoadGenerator {
    /// Generator over `connector` with default parameters
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            policy: RetryPolicy::new(),
            defaults: LoadParams::default(),
        }
    }

    /// Set the transient retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the parameters shared by every worker
    pub fn defaults(mut self, params: LoadParams) -> Self {
        self.defaults = params;
        self
    }

    /// Start `workers` load workers and return immediately
    pub fn start(&self, workers: usize, overrides: Overrides<LoadOverrides>) -> Result<RunningLoad> {
        let stop = Arc::new(AtomicBool::new(false));
        let plan = Harness::plan(workers, &self.defaults, overrides);

        let mut handles = Vec::with_capacity(workers);
        for (id, params) in plan.into_iter().enumerate() {
            let connector = Arc::clone(&self.connector);
            let policy = self.policy.clone();
            let stop_flag = Arc::clone(&stop);
            let spawned = thread::Builder::new()
                .name(format!("load-{}", id))
                .spawn(move || run_load(id, &params, connector.as_ref(), &policy, &stop_flag));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    let partial = RunningLoad { stop, handles };
                    partial.finish();
                    return Err(Error::Io(e));
                }
            }
        }
        tracing::info!(workers = handles.len(), "background load started");
        Ok(RunningLoad { stop, handles })
    }
}

impl std::fmt::Debug for LoadGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadGenerator")
            .field("policy", &self.policy)
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Handle to running load workers
///
/// Dropping the handle without calling [`RunningLoad::finish`] still stops
/// and joins the workers.
#[derive(Debug)]
pub struct RunningLoad {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<Result<LoadReport>>>,
}

impl RunningLoad {
    /// Number of workers started
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Check if the stop flag has been raised
    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Raise the stop flag and wait for every worker to exit
    pub fn finish(mut self) -> Vec<Result<LoadReport>> {
        self.join_all()
    }

    fn join_all(&mut self) -> Vec<Result<LoadReport>> {
        self.stop.store(true, Ordering::Release);
        let reports: Vec<_> = self
            .handles
            .drain(..)
            .enumerate()
            .map(|(worker, handle)| {
                handle
                    .join()
                    .unwrap_or(Err(Error::WorkerPanicked { worker }))
            })
            .collect();
        if !reports.is_empty() {
            tracing::info!(workers = reports.len(), "background load stopped");
        }
        reports
    }
}

impl Drop for RunningLoad {
    fn drop(&mut self) {
        for report in self.join_all() {
            if let Err(e) = report {
                tracing::warn!(error = %e, "load worker failed");
            }
        }
    }
}

fn run_load(
    worker: usize,
    params: &LoadParams,
    connector: &dyn Connector,
    policy: &RetryPolicy,
    stop: &AtomicBool,
) -> Result<LoadReport> {
    let mut session = connector.connect()?;
    let mut counters = RetryCounters::new();
    let record = insert_private_record(session.as_mut(), policy, &mut counters)?;

    let mut report = LoadReport {
        worker,
        record: record.clone(),
        cycles: 0,
        selects: 0,
        updates: 0,
        counters: RetryCounters::new(),
    };

    let cycled = cycle_until_stopped(
        worker,
        params,
        session.as_mut(),
        &record,
        policy,
        stop,
        &mut counters,
        &mut report,
    );

    // The private record goes away even when the cycle loop failed.
    let deleted = policy.run_counted(&mut counters, || session.delete(&record));
    report.counters = counters;
    match (cycled, deleted) {
        (Err(e), deleted) => {
            if let Err(delete) = deleted {
                tracing::warn!(worker, record = %record, error = %delete, "could not delete load record");
            }
            Err(e)
        }
        (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(_)) => {
            tracing::debug!(worker, record = %record, cycles = report.cycles, "load worker finished");
            Ok(report)
        }
    }
}

/// Read and update `record` until the stop flag is raised
#[allow(clippy::too_many_arguments)]
fn cycle_until_stopped(
    worker: usize,
    params: &LoadParams,
    session: &mut dyn Session,
    record: &RecordId,
    policy: &RetryPolicy,
    stop: &AtomicBool,
    counters: &mut RetryCounters,
    report: &mut LoadReport,
) -> Result<()> {
    let delay = params.operation_delay();
    while !stop.load(Ordering::Acquire) {
        for _ in 0..params.selects {
            policy.run_counted(counters, || session.get(record))?;
            report.selects += 1;
            thread::sleep(delay);
        }
        for i in 0..params.updates {
            let marker = format!("{}-{}", worker, params.selects + i);
            policy.run_counted(counters, || {
                session.update_where(record, &[(Field::AttachStatus, marker.clone())], &[])
            })?;
            report.updates += 1;
            thread::sleep(delay);
        }
        report.cycles += 1;
    }
    Ok(())
}

/// Insert a fresh record, drawing a new id on primary key collisions
fn insert_private_record(
    session: &mut dyn Session,
    policy: &RetryPolicy,
    counters: &mut RetryCounters,
) -> Result<RecordId> {
    loop {
        let id = RecordId::generate();
        let inserted = policy.run_counted(counters, || {
            session.insert(Record::new(id.clone(), status::AVAILABLE))
        });
        match inserted {
            Ok(()) => return Ok(id),
            Err(Error::Store(e)) if e.is_duplicate_key() => continue,
            Err(e) => return Err(e),
        }
    }
}
