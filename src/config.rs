//! Benchmark configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration. All durations are in milliseconds.
//!
//! ```toml
//! workers = 6
//! records = 1
//!
//! [worker]
//! iterations = 100
//!
//! [cluster]
//! replicas = 3
//! propagation_delay_ms = 20
//!
//! [strategy]
//! kinds = ["for_update", "coordinated_update_with_where"]
//! lease_scope = "per_transition"
//!
//! [coordinator]
//! backend = "file"
//! dir = "/tmp/rowbench-locks"
//! ```
//!
//! Components never read this type themselves; [`Benchmark`](crate::Benchmark)
//! turns it into plain policies and parameters.

use crate::error::{Error, Result};
use rowbench_concurrency::{
    CoordinatorService, LeaseConfig, LeaseScope, PreconditionWait, RetryPolicy, StrategyKind,
};
use rowbench_engine::{CheckPolicy, LoadParams, WorkerParams};
use rowbench_storage::ClusterConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level benchmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Transition workers per strategy run
    pub workers: usize,
    /// Records seeded before each run
    pub records: usize,
    /// Parameters shared by every transition worker
    pub worker: WorkerParams,
    /// Simulated cluster
    pub cluster: ClusterConfig,
    /// Transient error and precondition retries
    pub retry: RetryConfig,
    /// Consistency check budget
    pub check: CheckConfig,
    /// Background load
    pub load: LoadConfig,
    /// Strategies to run
    pub strategy: StrategyConfig,
    /// Lease coordinator for coordinated strategies
    pub coordinator: CoordinatorConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            records: 1,
            worker: WorkerParams::default(),
            cluster: ClusterConfig::default(),
            retry: RetryConfig::default(),
            check: CheckConfig::default(),
            load: LoadConfig::default(),
            strategy: StrategyConfig::default(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Encode as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.records == 0 {
            return Err(Error::Config("records must be at least 1".into()));
        }
        if self.cluster.replicas == 0 {
            return Err(Error::Config("cluster.replicas must be at least 1".into()));
        }
        self.cluster.validate()?;
        if self.check.attempts == 0 {
            return Err(Error::Config("check.attempts must be at least 1".into()));
        }
        if self.strategy.kinds.is_empty() {
            return Err(Error::Config("strategy.kinds must name at least one strategy".into()));
        }
        if self.strategy.kinds.iter().any(|k| k.is_coordinated()) {
            self.coordinator.validate()?;
        }
        Ok(())
    }

    /// Set the number of transition workers
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Set the number of seeded records
    pub fn records(mut self, n: usize) -> Self {
        self.records = n;
        self
    }

    /// Set the cycles each worker runs
    pub fn iterations(mut self, n: usize) -> Self {
        self.worker.iterations = n;
        self
    }

    /// Capture per-call profiles
    pub fn profile(mut self, enabled: bool) -> Self {
        self.worker.profile = enabled;
        self
    }

    /// Run a single strategy
    pub fn strategy(mut self, kind: StrategyKind) -> Self {
        self.strategy.kinds = vec![kind];
        self
    }

    /// Run several strategies, one after the other
    pub fn strategies(mut self, kinds: impl IntoIterator<Item = StrategyKind>) -> Self {
        self.strategy.kinds = kinds.into_iter().collect();
        self
    }

    /// Set the lease scope of coordinated strategies
    pub fn lease_scope(mut self, scope: LeaseScope) -> Self {
        self.strategy.lease_scope = scope;
        self
    }

    /// Set the cluster shape
    pub fn cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    /// Set the retry configuration
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the check budget
    pub fn check(mut self, check: CheckConfig) -> Self {
        self.check = check;
        self
    }

    /// Set the background load
    pub fn load(mut self, load: LoadConfig) -> Self {
        self.load = load;
        self
    }

    /// Set the lease coordinator
    pub fn coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }
}

/// Retry timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Sleep between transient error retries
    pub delay_ms: u64,
    /// Cap on transient retries per operation; unbounded when absent
    pub max_retries: Option<u32>,
    /// Sleep between precondition waits
    pub precondition_delay_ms: u64,
    /// Cap on precondition waits per transition; unbounded when absent
    pub max_precondition_waits: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: 10,
            max_retries: None,
            precondition_delay_ms: 10,
            max_precondition_waits: None,
        }
    }
}

impl RetryConfig {
    /// Transient error policy
    pub fn policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new().with_delay(Duration::from_millis(self.delay_ms));
        match self.max_retries {
            Some(max) => policy.with_max_retries(max),
            None => policy,
        }
    }

    /// Precondition loop
    pub fn precondition_wait(&self) -> PreconditionWait {
        let wait = PreconditionWait::new().with_delay(Duration::from_millis(self.precondition_delay_ms));
        match self.max_precondition_waits {
            Some(max) => wait.with_max_waits(max),
            None => wait,
        }
    }
}

/// Consistency check budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Attempts for mismatches, and separately for other errors
    pub attempts: u32,
    /// Backoff unit; the n-th mismatch sleeps `n * backoff_step_ms`
    pub backoff_step_ms: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        let policy = CheckPolicy::default();
        Self {
            attempts: policy.attempts,
            backoff_step_ms: policy.backoff_step.as_millis() as u64,
        }
    }
}

impl CheckConfig {
    /// Checker policy
    pub fn policy(&self) -> CheckPolicy {
        CheckPolicy {
            attempts: self.attempts,
            backoff_step: Duration::from_millis(self.backoff_step_ms),
        }
    }
}

/// Background load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Load workers; zero disables background load
    pub workers: usize,
    /// Point reads per cycle
    pub selects: u32,
    /// Updates per cycle
    pub updates: u32,
    /// Duration of one cycle
    pub cycle_time_ms: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        let params = LoadParams::default();
        Self {
            workers: 2,
            selects: params.selects,
            updates: params.updates,
            cycle_time_ms: params.cycle_time_ms,
        }
    }
}

impl LoadConfig {
    /// Parameters shared by every load worker
    pub fn params(&self) -> LoadParams {
        LoadParams {
            selects: self.selects,
            updates: self.updates,
            cycle_time_ms: self.cycle_time_ms,
        }
    }
}

/// Strategies to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Strategies, run in order
    pub kinds: Vec<StrategyKind>,
    /// Lease scope of coordinated strategies
    pub lease_scope: LeaseScope,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kinds: vec![StrategyKind::ForUpdate],
            lease_scope: LeaseScope::default(),
        }
    }
}

/// Lease coordinator backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorBackend {
    /// Lock files in a shared directory
    File,
    /// In-process lock table
    #[default]
    Ipc,
    /// In-memory key-value store with TTL keys
    Kv,
}

/// Lease coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Backend
    pub backend: CoordinatorBackend,
    /// Lock directory of the file backend
    pub dir: Option<PathBuf>,
    /// Lease lifetime without a heartbeat
    pub ttl_ms: u64,
    /// Heartbeat interval; zero disables heartbeats
    pub heartbeat_ms: u64,
    /// Delay between acquisition attempts
    pub retry_delay_ms: u64,
    /// Give up waiting for a lease after this long; waits forever when absent
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            backend: CoordinatorBackend::default(),
            dir: None,
            ttl_ms: 10_000,
            heartbeat_ms: 1_000,
            retry_delay_ms: 10,
            acquire_timeout_ms: None,
        }
    }
}

impl CoordinatorConfig {
    /// File backend rooted at `dir`
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: CoordinatorBackend::File,
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Key-value backend
    pub fn kv() -> Self {
        Self {
            backend: CoordinatorBackend::Kv,
            ..Self::default()
        }
    }

    /// Reject unusable coordinator settings
    pub fn validate(&self) -> Result<()> {
        if self.backend == CoordinatorBackend::File && self.dir.is_none() {
            return Err(Error::Config("coordinator.dir is required by the file backend".into()));
        }
        if self.ttl_ms == 0 {
            return Err(Error::Config("coordinator.ttl_ms must be positive".into()));
        }
        if self.ttl_ms > ClusterConfig::MAX_DELAY_MS {
            return Err(Error::Config(format!(
                "coordinator.ttl_ms ({}) exceeds {} ms",
                self.ttl_ms,
                ClusterConfig::MAX_DELAY_MS
            )));
        }
        if self.heartbeat_ms >= self.ttl_ms {
            return Err(Error::Config(format!(
                "coordinator.heartbeat_ms ({}) must be shorter than ttl_ms ({})",
                self.heartbeat_ms, self.ttl_ms
            )));
        }
        Ok(())
    }

    /// Create the coordination service
    ///
    /// Every call creates a new service; strategies that must exclude each
    /// other have to share one.
    pub fn service(&self) -> Result<CoordinatorService> {
        self.validate()?;
        let ttl = Duration::from_millis(self.ttl_ms);
        Ok(match self.backend {
            CoordinatorBackend::File => {
                let dir = self.dir.clone().ok_or_else(|| {
                    Error::Config("coordinator.dir is required by the file backend".into())
                })?;
                CoordinatorService::file(dir, ttl)
            }
            CoordinatorBackend::Ipc => CoordinatorService::ipc(),
            CoordinatorBackend::Kv => CoordinatorService::memory_kv(ttl),
        })
    }

    /// Lease timing
    pub fn lease_config(&self) -> LeaseConfig {
        let lease = LeaseConfig::default()
            .retry_delay(Duration::from_millis(self.retry_delay_ms))
            .heartbeat_interval(Duration::from_millis(self.heartbeat_ms));
        match self.acquire_timeout_ms {
            Some(ms) => lease.acquire_timeout(Duration::from_millis(ms)),
            None => lease,
        }
    }
}
