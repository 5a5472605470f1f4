//! Convenient imports for rowbench.
//!
//! ```ignore
//! use rowbench::prelude::*;
//!
//! let bench = Benchmark::new(BenchConfig::new().strategy(StrategyKind::UpdateWithWhere))?;
//! let report = bench.run(StrategyKind::UpdateWithWhere, Overrides::None)?;
//! ```

// Main entry point
pub use crate::benchmark::{Benchmark, RunReport};
pub use crate::config::{BenchConfig, CoordinatorConfig, LoadConfig, RetryConfig};

// Error handling
pub use crate::error::{Error, Result};

// Strategies
pub use rowbench_concurrency::{LeaseScope, StrategyKind};

// Harness and results
pub use rowbench_core::{Outcome, ResultDataPoint, RetryCounters};
pub use rowbench_engine::{Overrides, Summary, WorkerOverrides};

// Simulated cluster
pub use rowbench_storage::{Cluster, ClusterConfig};
