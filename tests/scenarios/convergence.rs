//! Replication Convergence Tests
//!
//! A successful transition must eventually be visible on every replica with
//! the attempt's marker, and checking converged replicas changes nothing.

use crate::*;
use rowbench::concurrency::{ConditionalUpdateStrategy, StrategyFactory, StrategyKind, TransitionStrategy};
use rowbench::core::{status, Field, ReplicaId, Session, TransitionAttempt};
use rowbench::engine::{CheckPolicy, ConsistencyChecker, TransitionWorker, WorkerParams};
use std::sync::Arc;

// ============================================================================
// Single transition
// ============================================================================

#[test]
fn three_replicas_agree_on_destination_and_marker() {
    let (cluster, id) = seeded(3, Duration::from_millis(30));
    let mut session = cluster.open_session(ReplicaId(0));
    let mut strategy = ConditionalUpdateStrategy::new(no_delay(), short_wait());

    let attempt = TransitionAttempt::new(id.clone(), status::AVAILABLE, status::DELETING, "w0_0");
    strategy.transition(&mut session, &attempt).unwrap();

    // production budget: 6 attempts, 0.25s * attempt backoff
    let mut checker = ConsistencyChecker::connect(&cluster, CheckPolicy::default()).unwrap();
    checker.verify_with_retry(&id, &attempt.expected_after()).unwrap();

    for replica in 0..3 {
        let mut s = cluster.open_session(ReplicaId(replica));
        let record = s.get(&id).unwrap().unwrap();
        assert_eq!(record.field(Field::Status), Some(status::DELETING));
        assert_eq!(record.field(Field::AttachStatus), Some("w0_0"));
    }
}

#[test]
fn lagging_replica_reported_until_it_catches_up() {
    let (cluster, id) = seeded(3, Duration::from_secs(60));
    let mut session = cluster.open_session(ReplicaId(2));
    let mut strategy = ConditionalUpdateStrategy::new(no_delay(), short_wait());
    let attempt = TransitionAttempt::new(id.clone(), status::AVAILABLE, status::DELETING, "w1_0");
    strategy.transition(&mut session, &attempt).unwrap();

    let mut checker = ConsistencyChecker::connect(&cluster, fast_check()).unwrap();
    let err = checker.verify(&id, &attempt.expected_after()).unwrap_err();
    assert!(err.is_wrong_data());
    assert!(err.to_string().contains("node-0"));

    cluster.flush_replication();
    assert_eq!(cluster.replication_lag(), 0);
    checker.verify(&id, &attempt.expected_after()).unwrap();
}

#[test]
fn checker_rerun_is_side_effect_free() {
    let (cluster, id) = seeded(3, Duration::ZERO);
    let mut session = cluster.open_session(ReplicaId(1));
    let mut strategy = ConditionalUpdateStrategy::new(no_delay(), short_wait());
    let attempt = TransitionAttempt::new(id.clone(), status::AVAILABLE, status::DELETING, "w2_7");
    strategy.transition(&mut session, &attempt).unwrap();
    cluster.flush_replication();

    let before = cluster.version();
    let mut checker = ConsistencyChecker::connect(&cluster, fast_check()).unwrap();
    for _ in 0..5 {
        checker.verify_with_retry(&id, &attempt.expected_after()).unwrap();
    }
    assert_eq!(cluster.version(), before);
    assert_eq!(cluster.record(&id).unwrap().attach_status.as_deref(), Some("w2_7"));
}

// ============================================================================
// Full worker cycles
// ============================================================================

#[test]
fn worker_cycles_converge_under_lag() {
    let cluster = cluster(3, Duration::from_millis(5));
    let records = cluster.populate(1).unwrap();
    let factory = StrategyFactory::new(StrategyKind::ForUpdate)
        .retry_policy(no_delay())
        .precondition_wait(short_wait());
    let worker = TransitionWorker::new(Arc::new(cluster.clone()), factory, fast_check(), records.clone());

    let params = WorkerParams {
        iterations: 5,
        ..WorkerParams::default()
    };
    let points = worker.run(3, params).unwrap();

    assert_eq!(points.len(), 5);
    assert!(points.iter().all(|p| p.is_ok()), "{:?}", points);
    assert!(points.iter().all(|p| p.check_error.is_none()));

    let record = cluster.record(&records[0]).unwrap();
    assert_eq!(record.status, status::AVAILABLE);
    assert_eq!(record.attach_status.as_deref(), Some("3_4"));
}
