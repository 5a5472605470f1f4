//! Benchmark runner.
//!
//! One run of one strategy:
//!
//! ```text
//! seed records -> start background load -> harness(N transition workers)
//!              -> stop load -> summarize
//! ```
//!
//! The cluster is created once and shared by consecutive runs; records are
//! reset to `available` at the start of each run.

use crate::config::BenchConfig;
use crate::error::Result;
use rowbench_concurrency::{CoordinatorService, StrategyFactory, StrategyKind};
use rowbench_core::{RecordId, ResultDataPoint};
use rowbench_engine::{
    summarize, Harness, LoadGenerator, LoadReport, Overrides, Summary, TransitionWorker,
    WorkerOverrides,
};
use rowbench_storage::Cluster;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one strategy run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Aggregated statistics
    pub summary: Summary,
    /// Every data point, in worker order
    pub points: Vec<ResultDataPoint>,
    /// Background load workers that finished cleanly
    pub load: Vec<LoadReport>,
    /// Workers that could not run at all, with the reason
    pub worker_errors: Vec<(usize, String)>,
}

impl RunReport {
    /// Write the data points as JSON lines
    pub fn write_points<W: Write>(&self, mut out: W) -> Result<()> {
        for point in &self.points {
            serde_json::to_writer(&mut out, point)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Runs configured strategies against a simulated cluster
pub struct Benchmark {
    config: BenchConfig,
    cluster: Cluster,
}

impl Benchmark {
    /// Validate `config` and build its cluster
    pub fn new(config: BenchConfig) -> Result<Self> {
        config.validate()?;
        let cluster = Cluster::new(config.cluster.clone())?;
        Ok(Self { config, cluster })
    }

    /// Configuration in use
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// The simulated cluster
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Run every configured strategy in order, one summary each
    pub fn run_all(&self) -> Result<Vec<RunReport>> {
        self.config
            .strategy
            .kinds
            .iter()
            .map(|kind| self.run(*kind, Overrides::None))
            .collect()
    }

    /// Run one strategy with per-worker overrides
    pub fn run(&self, kind: StrategyKind, overrides: Overrides<WorkerOverrides>) -> Result<RunReport> {
        let records = self.cluster.populate(self.config.records)?;
        let factory = self.factory(kind)?;
        let connector = Arc::new(self.cluster.clone());

        tracing::info!(
            strategy = %kind,
            workers = self.config.workers,
            records = records.len(),
            "run started"
        );

        let load = if self.config.load.workers > 0 {
            let generator = LoadGenerator::new(connector.clone())
                .retry_policy(self.config.retry.policy())
                .defaults(self.config.load.params());
            Some(generator.start(self.config.load.workers, Overrides::None)?)
        } else {
            None
        };

        let started = Instant::now();
        let outcome = self.run_workers(connector, factory, records, overrides);
        let elapsed = started.elapsed();

        let load_reports = load.map(|running| running.finish()).unwrap_or_default();
        let results = outcome?;

        let mut points = Vec::new();
        let mut worker_errors = Vec::new();
        for (worker, result) in results.into_iter().enumerate() {
            match result {
                Ok(mut worker_points) => points.append(&mut worker_points),
                Err(e) => {
                    tracing::warn!(worker, error = %e, "worker did not run");
                    worker_errors.push((worker, e.to_string()));
                }
            }
        }

        let mut load = Vec::with_capacity(load_reports.len());
        for report in load_reports {
            match report {
                Ok(report) => load.push(report),
                Err(e) => tracing::warn!(error = %e, "load worker failed"),
            }
        }

        let summary = summarize(kind.as_str(), elapsed, &points);
        tracing::info!(
            strategy = %kind,
            ok = summary.ok,
            errors = summary.errors,
            secs = summary.total_time_secs,
            "run finished"
        );
        Ok(RunReport {
            summary,
            points,
            load,
            worker_errors,
        })
    }

    fn run_workers(
        &self,
        connector: Arc<Cluster>,
        factory: StrategyFactory,
        records: Vec<RecordId>,
        overrides: Overrides<WorkerOverrides>,
    ) -> Result<Vec<rowbench_core::Result<Vec<ResultDataPoint>>>> {
        let worker = TransitionWorker::new(connector, factory, self.config.check.policy(), records);
        let harness = Harness::new("transition");
        let results = harness.run(
            self.config.workers,
            self.config.worker.clone(),
            overrides,
            move |id, params| worker.run(id, params),
        )?;
        Ok(results)
    }

    fn factory(&self, kind: StrategyKind) -> Result<StrategyFactory> {
        let factory = StrategyFactory::new(kind)
            .retry_policy(self.config.retry.policy())
            .precondition_wait(self.config.retry.precondition_wait());
        if !kind.is_coordinated() {
            return Ok(factory);
        }
        // one service per run, shared by every worker's strategy
        let service: CoordinatorService = self.config.coordinator.service()?;
        Ok(factory
            .coordinator(service)
            .lease_config(self.config.coordinator.lease_config())
            .lease_scope(self.config.strategy.lease_scope))
    }
}

impl std::fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Benchmark")
            .field("config", &self.config)
            .finish()
    }
}
