//! Concurrency layer for rowbench
//!
//! This crate implements the competing ways of moving a contended record
//! between states:
//! - [`RetryPolicy`]: transient store error classification and retry loop
//! - [`RowLockStrategy`]: pessimistic `SELECT ... FOR UPDATE` then write
//! - [`ConditionalUpdateStrategy`]: optimistic `UPDATE ... WHERE status = ?`
//! - [`CoordinatedStrategy`]: either of the above behind a distributed lease
//! - [`coordinator`]: lease acquisition, heartbeating and release over
//!   pluggable backends (local file, local IPC, networked key-value)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conditional;
pub mod coordinated;
pub mod coordinator;
pub mod retry;
pub mod row_lock;
pub mod strategy;

pub use conditional::ConditionalUpdateStrategy;
pub use coordinated::{CoordinatedStrategy, LeaseScope};
pub use coordinator::{
    Coordinator, CoordinatorService, FileCoordinator, IpcCoordinator, IpcHub, KvCoordinator,
    KvStore, Lease, LeaseConfig, LeaseManager, LeaseStats, MemoryKv,
};
pub use retry::{Retried, RetryPolicy};
pub use row_lock::RowLockStrategy;
pub use strategy::{
    AtomicWrite, PreconditionWait, StrategyFactory, StrategyKind, TransitionStrategy,
    WriteOutcome,
};
