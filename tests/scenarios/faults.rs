//! Fault Injection Tests
//!
//! Transient store errors are retried and counted by kind; they never fail an
//! iteration. Unclassified errors end the iteration but not the run.

use crate::*;
use rowbench::concurrency::{
    ConditionalUpdateStrategy, RowLockStrategy, StrategyFactory, StrategyKind, TransitionStrategy,
};
use rowbench::core::error::codes;
use rowbench::core::{status, Outcome, ReplicaId, StoreError, TransitionAttempt};
use rowbench::engine::{TransitionWorker, WorkerParams};
use rowbench::storage::FaultPoint;
use std::sync::Arc;

fn forward(id: &rowbench::core::RecordId, marker: &str) -> TransitionAttempt {
    TransitionAttempt::new(id.clone(), status::AVAILABLE, status::DELETING, marker)
}

// ============================================================================
// Retry counters
// ============================================================================

#[test]
fn deadlock_on_row_lock_counts_one_per_injection() {
    for injections in 1..=3u32 {
        let (cluster, id) = seeded(1, Duration::ZERO);
        let mut session = cluster.open_session(ReplicaId(0));
        let mut strategy = RowLockStrategy::new(no_delay(), short_wait());

        cluster
            .faults()
            .inject(FaultPoint::SelectForUpdate, StoreError::deadlock(), injections);
        let counters = strategy.transition(&mut session, &forward(&id, "w0_0")).unwrap();

        assert_eq!(counters.deadlock, injections);
        assert_eq!(counters.lock_timeout, 0);
        assert_eq!(counters.disconnect, 0);
        assert_eq!(cluster.record(&id).unwrap().status, status::DELETING);
    }
}

#[test]
fn lost_connection_reconnects_and_counts() {
    let (cluster, id) = seeded(2, Duration::ZERO);
    let mut session = cluster.open_session(ReplicaId(1));
    let mut strategy = ConditionalUpdateStrategy::new(no_delay(), short_wait());

    cluster
        .faults()
        .inject(FaultPoint::UpdateWhere, StoreError::lost_connection(), 2);
    let counters = strategy.transition(&mut session, &forward(&id, "w0_0")).unwrap();

    assert_eq!(counters.disconnect, 2);
    assert_eq!(session.reconnects(), 2);
}

#[test]
fn lock_wait_timeout_counted_separately() {
    let (cluster, id) = seeded(1, Duration::ZERO);
    let mut session = cluster.open_session(ReplicaId(0));
    let mut strategy = RowLockStrategy::new(no_delay(), short_wait());

    cluster
        .faults()
        .inject(FaultPoint::SelectForUpdate, StoreError::lock_wait_timeout(), 1);
    cluster.faults().inject(FaultPoint::Commit, StoreError::deadlock(), 1);
    let counters = strategy.transition(&mut session, &forward(&id, "w0_0")).unwrap();

    assert_eq!(counters.lock_timeout, 1);
    assert_eq!(counters.deadlock, 1);
    assert_eq!(counters.total(), 2);
}

// ============================================================================
// Iteration outcomes
// ============================================================================

#[test]
fn transient_errors_never_fail_an_iteration() {
    let (cluster, id) = seeded(2, Duration::ZERO);
    let factory = StrategyFactory::new(StrategyKind::UpdateWithWhere).retry_policy(no_delay());
    let worker = TransitionWorker::new(Arc::new(cluster.clone()), factory, fast_check(), vec![id]);

    cluster.faults().inject(FaultPoint::UpdateWhere, StoreError::deadlock(), 4);
    let points = worker
        .run(0, WorkerParams { iterations: 3, ..WorkerParams::default() })
        .unwrap();

    assert!(points.iter().all(|p| p.is_ok()));
    let deadlocks: u32 = points.iter().map(|p| p.counters.deadlock).sum();
    assert_eq!(deadlocks, 4);
}

#[test]
fn unclassified_error_fails_only_its_iteration() {
    let (cluster, id) = seeded(2, Duration::ZERO);
    let factory = StrategyFactory::new(StrategyKind::ForUpdate).retry_policy(no_delay());
    let worker = TransitionWorker::new(Arc::new(cluster.clone()), factory, fast_check(), vec![id.clone()]);

    cluster.faults().inject(
        FaultPoint::SelectForUpdate,
        StoreError::new(codes::GENERIC, "table is read only"),
        1,
    );
    let points = worker
        .run(0, WorkerParams { iterations: 3, ..WorkerParams::default() })
        .unwrap();

    assert!(matches!(points[0].outcome, Outcome::Failed(ref reason) if reason.contains("read only")));
    assert!(points[1].is_ok());
    assert!(points[2].is_ok());
    assert_eq!(cluster.record(&id).unwrap().status, status::AVAILABLE);
}

#[test]
fn bounded_retry_policy_surfaces_exhaustion() {
    let (cluster, id) = seeded(1, Duration::ZERO);
    let mut session = cluster.open_session(ReplicaId(0));
    let mut strategy = ConditionalUpdateStrategy::new(no_delay().with_max_retries(2), short_wait());

    cluster.faults().inject(FaultPoint::UpdateWhere, StoreError::deadlock(), 10);
    let err = strategy.transition(&mut session, &forward(&id, "w0_0")).unwrap_err();
    assert!(matches!(err, rowbench::core::Error::RetriesExhausted { retries: 2, .. }));
    cluster.faults().clear();
}
