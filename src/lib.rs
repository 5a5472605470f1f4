//! # rowbench
//!
//! Contention benchmark for single-row state transitions on a multi-master
//! replicated store.
//!
//! N workers drive one record through `available -> deleting -> available`
//! using a chosen transition strategy, verify after every acquire that all
//! replicas converge on the new state and marker, and emit timing and retry
//! data points that are summarized per strategy.
//!
//! ## Quick Start
//!
//! ```ignore
//! use rowbench::prelude::*;
//!
//! rowbench::logging::init();
//!
//! let config = BenchConfig::from_path("bench.toml")?;
//! let bench = Benchmark::new(config)?;
//! for report in bench.run_all()? {
//!     println!("{}", report.summary);
//! }
//! ```
//!
//! ## Strategies
//!
//! - `for_update` - row lock, read, compare, write, commit
//! - `update_with_where` - single conditional update, zero rows means retry
//! - `coordinated_*` - either of the above behind a distributed lease
//!
//! ## Crates
//!
//! - [`rowbench_core`] - errors, record types, data points, storage traits
//! - [`rowbench_storage`] - simulated replicated cluster with fault injection
//! - [`rowbench_concurrency`] - retry policy, strategies, lease coordinators
//! - [`rowbench_engine`] - harness, workers, checker, load, statistics

#![warn(missing_docs)]

mod benchmark;
mod config;
mod error;

pub mod logging;
pub mod prelude;

pub use benchmark::{Benchmark, RunReport};
pub use config::{
    BenchConfig, CheckConfig, CoordinatorBackend, CoordinatorConfig, LoadConfig, RetryConfig,
    StrategyConfig,
};
pub use error::{Error, Result};

pub use rowbench_concurrency as concurrency;
pub use rowbench_core as core;
pub use rowbench_engine as engine;
pub use rowbench_storage as storage;
