//! Contention Tests
//!
//! Many workers race for the same record. Exactly one writer wins each
//! state window; the rest see the precondition fail and wait.

use crate::*;
use rowbench::concurrency::{
    AtomicWrite, ConditionalUpdateStrategy, RowLockStrategy, StrategyFactory, StrategyKind,
    WriteOutcome,
};
use rowbench::core::{status, ReplicaId, RetryCounters, TransitionAttempt};
use rowbench::engine::{Harness, Overrides, TransitionWorker, WorkerOverrides, WorkerParams};
use std::sync::{Arc, Barrier};
use std::thread;

const NUM_WORKERS: usize = 6;

fn race<W>(write: W, replicas: usize) -> Vec<WriteOutcome>
where
    W: AtomicWrite + Clone + Sync + 'static,
{
    let (cluster, id) = seeded(replicas, Duration::ZERO);
    let barrier = Arc::new(Barrier::new(NUM_WORKERS));

    let handles: Vec<_> = (0..NUM_WORKERS)
        .map(|worker| {
            let cluster = cluster.clone();
            let barrier = Arc::clone(&barrier);
            let write = write.clone();
            let id = id.clone();
            thread::spawn(move || {
                let mut session = cluster.open_session(ReplicaId(worker % replicas));
                let attempt = TransitionAttempt::new(
                    id,
                    status::AVAILABLE,
                    status::DELETING,
                    TransitionAttempt::marker_for(worker, 0),
                );
                let mut counters = RetryCounters::new();
                barrier.wait();
                write.try_write(&mut session, &attempt, &mut counters).unwrap()
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

// ============================================================================
// One state window
// ============================================================================

#[test]
fn six_conditional_writers_exactly_one_wins() {
    let outcomes = race(ConditionalUpdateStrategy::new(no_delay(), short_wait()), 3);
    let applied = outcomes.iter().filter(|o| **o == WriteOutcome::Applied).count();
    assert_eq!(applied, 1);
    assert_eq!(outcomes.len() - applied, NUM_WORKERS - 1);
}

#[test]
fn six_row_lock_writers_exactly_one_wins() {
    let outcomes = race(RowLockStrategy::new(no_delay(), short_wait()), 1);
    let applied = outcomes.iter().filter(|o| **o == WriteOutcome::Applied).count();
    assert_eq!(applied, 1);
}

// ============================================================================
// Full cycles
// ============================================================================

fn contend(kind: StrategyKind, iterations: usize) {
    let cluster = cluster(3, Duration::from_millis(1));
    let records = cluster.populate(1).unwrap();
    let factory = StrategyFactory::new(kind)
        .retry_policy(no_delay())
        .precondition_wait(short_wait());
    let worker = TransitionWorker::new(Arc::new(cluster.clone()), factory, fast_check(), records.clone());

    let params = WorkerParams {
        iterations,
        ..WorkerParams::default()
    };
    let results = Harness::new("contend")
        .run(NUM_WORKERS, params, Overrides::<WorkerOverrides>::None, move |id, p| worker.run(id, p))
        .unwrap();

    let points: Vec<_> = results.into_iter().flat_map(|r| r.unwrap()).collect();
    assert_eq!(points.len(), NUM_WORKERS * iterations);
    // a second writer inside a window would overwrite the marker and fail
    // the first writer's check
    assert!(points.iter().all(|p| p.is_ok()), "{:?}", points);

    let record = cluster.record(&records[0]).unwrap();
    assert_eq!(record.status, status::AVAILABLE);
}

#[test]
fn conditional_update_cycles_under_contention() {
    contend(StrategyKind::UpdateWithWhere, 4);
}

#[test]
fn row_lock_cycles_under_contention() {
    contend(StrategyKind::ForUpdate, 4);
}

#[test]
fn workers_on_distinct_records_do_not_wait() {
    let cluster = cluster(2, Duration::ZERO);
    let records = cluster.populate(NUM_WORKERS).unwrap();
    let factory = StrategyFactory::new(StrategyKind::UpdateWithWhere).retry_policy(no_delay());
    let worker = TransitionWorker::new(Arc::new(cluster.clone()), factory, fast_check(), records.clone());

    let overrides = Overrides::Lazy(Box::new((0..).map(|i| WorkerOverrides {
        record_index: Some(i),
        ..WorkerOverrides::default()
    })));
    let params = WorkerParams {
        iterations: 3,
        ..WorkerParams::default()
    };
    let results = Harness::default()
        .run(NUM_WORKERS, params, overrides, move |id, p| worker.run(id, p))
        .unwrap();

    for (worker, result) in results.into_iter().enumerate() {
        assert!(result.unwrap().iter().all(|p| p.is_ok()));
        let record = cluster.record(&records[worker]).unwrap();
        assert_eq!(record.attach_status, Some(TransitionAttempt::marker_for(worker, 2)));
    }
}
