//! Storage layer for rowbench
//!
//! This crate implements an in-memory multi-master cluster that stands in for
//! the replicated relational store under test:
//! - [`Cluster`]: authoritative committed state plus one lagged view per replica
//! - [`ReplicaView`]: per-replica rows fed by a delayed replication stream
//! - [`LockTable`]: row locks with lock-wait timeout
//! - [`ClusterSession`]: one connection, implementing [`rowbench_core::Session`]
//! - [`FaultInjector`]: makes the next N matching statements fail with a chosen error

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod faults;
pub mod locks;
pub mod replica;
pub mod session;

pub use cluster::{Cluster, ClusterConfig};
pub use faults::{FaultInjector, FaultPoint};
pub use locks::LockTable;
pub use replica::ReplicaView;
pub use session::ClusterSession;
