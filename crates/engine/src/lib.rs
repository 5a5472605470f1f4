//! Benchmark engine for rowbench
//!
//! Ties the store, the strategies and the checker together:
//! - [`Harness`]: runs N workers on OS threads with per-worker overrides
//! - [`TransitionWorker`]: the measured `A -> B`, check, `B -> A` loop
//! - [`ConsistencyChecker`]: compares every replica against expected fields
//! - [`LoadGenerator`]: background reads and writes on private records
//! - [`summarize`]: statistics over the emitted data points

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checker;
pub mod harness;
pub mod stats;
pub mod worker;
pub mod workload;

pub use checker::{CheckPolicy, ConsistencyChecker};
pub use harness::{ApplyOverride, Harness, Overrides};
pub use stats::{summarize, ProfileEntry, Stats, Summary};
pub use worker::{TransitionWorker, WorkerOverrides, WorkerParams};
pub use workload::{LoadGenerator, LoadOverrides, LoadParams, LoadReport, RunningLoad};
