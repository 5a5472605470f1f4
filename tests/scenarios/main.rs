//! Scenario Test Suite
//!
//! End-to-end scenarios over the simulated cluster: replication convergence,
//! contention between workers, injected store faults, lease lifecycles and
//! the configuration-driven runner.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all scenarios
//! cargo test --test scenarios
//!
//! # Run lease scenarios only
//! cargo test --test scenarios leases::
//! ```

use rowbench::concurrency::{PreconditionWait, RetryPolicy};
use rowbench::core::RecordId;
use rowbench::engine::CheckPolicy;
use rowbench::storage::{Cluster, ClusterConfig};
use std::time::Duration;

// Test modules
pub mod config_files;
pub mod contention;
pub mod convergence;
pub mod faults;
pub mod leases;
pub mod runner;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Cluster with `replicas` nodes and a fixed replication delay
pub fn cluster(replicas: usize, delay: Duration) -> Cluster {
    rowbench::logging::init_for_tests();
    Cluster::new(
        ClusterConfig::new()
            .replicas(replicas)
            .propagation_delay(delay)
            .propagation_jitter(Duration::ZERO),
    )
    .unwrap()
}

/// Cluster seeded with one available record
pub fn seeded(replicas: usize, delay: Duration) -> (Cluster, RecordId) {
    let cluster = cluster(replicas, delay);
    let id = cluster.populate(1).unwrap().remove(0);
    (cluster, id)
}

/// Retry policy without sleeps
pub fn no_delay() -> RetryPolicy {
    RetryPolicy::new().with_delay(Duration::ZERO)
}

/// Short precondition wait
pub fn short_wait() -> PreconditionWait {
    PreconditionWait::new().with_delay(Duration::from_millis(1))
}

/// Check budget scaled down for tests
pub fn fast_check() -> CheckPolicy {
    CheckPolicy {
        attempts: 6,
        backoff_step: Duration::from_millis(10),
    }
}
