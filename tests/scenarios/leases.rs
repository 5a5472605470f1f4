//! Lease Tests
//!
//! Coordinated strategies take a lease around their writes. The lease is
//! released exactly once per attempt on every exit path, and no backend is
//! left holding a lock after a run.

use crate::*;
use rowbench::concurrency::{
    ConditionalUpdateStrategy, CoordinatedStrategy, CoordinatorService, IpcHub, LeaseConfig,
    LeaseManager, LeaseScope, StrategyFactory, StrategyKind, TransitionStrategy,
};
use rowbench::core::error::codes;
use rowbench::core::{status, ReplicaId, StoreError, TransitionAttempt};
use rowbench::engine::{Harness, Overrides, TransitionWorker, WorkerOverrides, WorkerParams};
use rowbench::storage::FaultPoint;
use std::sync::Arc;

fn lease_config() -> LeaseConfig {
    LeaseConfig::default()
        .retry_delay(Duration::from_millis(1))
        .heartbeat_interval(Duration::from_millis(20))
}

fn coordinated(hub: &IpcHub, scope: LeaseScope) -> CoordinatedStrategy<ConditionalUpdateStrategy> {
    let service = CoordinatorService::Ipc(hub.clone());
    let leases = LeaseManager::new(service.connect().unwrap(), lease_config()).unwrap();
    CoordinatedStrategy::new(
        ConditionalUpdateStrategy::new(no_delay(), short_wait()),
        leases,
        scope,
        short_wait(),
    )
}

fn forward(id: &rowbench::core::RecordId) -> TransitionAttempt {
    TransitionAttempt::new(id.clone(), status::AVAILABLE, status::DELETING, "w0_0")
}

// ============================================================================
// Exit paths
// ============================================================================

#[test]
fn lease_released_once_after_successful_write() {
    let (cluster, id) = seeded(2, Duration::ZERO);
    let hub = IpcHub::new();
    let mut strategy = coordinated(&hub, LeaseScope::PerTransition);
    let mut session = cluster.open_session(ReplicaId(0));

    strategy.transition(&mut session, &forward(&id)).unwrap();
    strategy.transition(&mut session, &forward(&id).reversed()).unwrap();

    let stats = strategy.leases().stats();
    assert_eq!(stats.acquired(), 2);
    assert_eq!(stats.released(), 2);
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(hub.held(), 0);
}

#[test]
fn lease_released_once_when_wrapped_write_fails() {
    let (cluster, id) = seeded(2, Duration::ZERO);
    let hub = IpcHub::new();
    let mut strategy = coordinated(&hub, LeaseScope::PerTransition);
    let mut session = cluster.open_session(ReplicaId(0));

    cluster.faults().inject(
        FaultPoint::UpdateWhere,
        StoreError::new(codes::GENERIC, "disk full"),
        1,
    );
    strategy.transition(&mut session, &forward(&id)).unwrap_err();

    let stats = strategy.leases().stats();
    assert_eq!(stats.acquired(), 1);
    assert_eq!(stats.released(), 1);
    assert_eq!(hub.held(), 0);
    assert_eq!(cluster.record(&id).unwrap().status, status::AVAILABLE);
}

#[test]
fn held_lease_spans_the_cycle_and_is_freed_on_return() {
    let (cluster, id) = seeded(2, Duration::ZERO);
    let hub = IpcHub::new();
    let mut strategy = coordinated(&hub, LeaseScope::HoldUntilReleased);
    let mut session = cluster.open_session(ReplicaId(0));

    strategy.transition(&mut session, &forward(&id)).unwrap();
    assert!(strategy.is_holding());
    assert_eq!(hub.held(), 1);

    strategy.transition(&mut session, &forward(&id).reversed()).unwrap();
    assert!(!strategy.is_holding());
    assert_eq!(hub.held(), 0);
    assert_eq!(strategy.leases().stats().acquired(), 1);
}

#[test]
fn dropping_a_strategy_frees_its_lease() {
    let (cluster, id) = seeded(1, Duration::ZERO);
    let hub = IpcHub::new();
    let mut strategy = coordinated(&hub, LeaseScope::HoldUntilReleased);
    let mut session = cluster.open_session(ReplicaId(0));

    strategy.transition(&mut session, &forward(&id)).unwrap();
    assert_eq!(hub.held(), 1);
    drop(strategy);
    assert_eq!(hub.held(), 0);
}

// ============================================================================
// Backends under contention
// ============================================================================

fn run_coordinated(service: CoordinatorService, kind: StrategyKind, scope: LeaseScope) {
    let cluster = cluster(3, Duration::from_millis(1));
    let records = cluster.populate(1).unwrap();
    let factory = StrategyFactory::new(kind)
        .retry_policy(no_delay())
        .precondition_wait(short_wait())
        .coordinator(service)
        .lease_config(lease_config())
        .lease_scope(scope);
    let worker = TransitionWorker::new(Arc::new(cluster.clone()), factory, fast_check(), records.clone());

    let params = WorkerParams {
        iterations: 3,
        ..WorkerParams::default()
    };
    let results = Harness::new("leased")
        .run(4, params, Overrides::<WorkerOverrides>::None, move |id, p| worker.run(id, p))
        .unwrap();

    let points: Vec<_> = results.into_iter().flat_map(|r| r.unwrap()).collect();
    assert_eq!(points.len(), 12);
    assert!(points.iter().all(|p| p.is_ok()), "{:?}", points);
    assert_eq!(cluster.record(&records[0]).unwrap().status, status::AVAILABLE);
}

#[test]
fn ipc_backend_per_transition() {
    let hub = IpcHub::new();
    run_coordinated(
        CoordinatorService::Ipc(hub.clone()),
        StrategyKind::CoordinatedUpdateWithWhere,
        LeaseScope::PerTransition,
    );
    assert_eq!(hub.held(), 0);
}

#[test]
fn ipc_backend_hold_until_released() {
    let hub = IpcHub::new();
    run_coordinated(
        CoordinatorService::Ipc(hub.clone()),
        StrategyKind::CoordinatedForUpdate,
        LeaseScope::HoldUntilReleased,
    );
    assert_eq!(hub.held(), 0);
}

#[test]
fn file_backend_leaves_no_lock_files() {
    let dir = tempfile::tempdir().unwrap();
    run_coordinated(
        CoordinatorService::file(dir.path(), Duration::from_secs(10)),
        StrategyKind::CoordinatedForUpdate,
        LeaseScope::PerTransition,
    );
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "lock"))
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[test]
fn kv_backend_per_transition() {
    run_coordinated(
        CoordinatorService::memory_kv(Duration::from_secs(10)),
        StrategyKind::CoordinatedUpdateWithWhere,
        LeaseScope::PerTransition,
    );
}
