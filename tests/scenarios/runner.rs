//! Runner Tests
//!
//! The configuration-driven runner: seeding, background load, the harness
//! and the per-strategy summary.

use rowbench::concurrency::StrategyKind;
use rowbench::engine::{Overrides, WorkerOverrides};
use rowbench::{BenchConfig, Benchmark, CheckConfig, CoordinatorConfig, LoadConfig, RetryConfig};
use rowbench::storage::ClusterConfig;
use std::time::Duration;

fn config() -> BenchConfig {
    rowbench::logging::init_for_tests();
    BenchConfig::new()
        .workers(3)
        .iterations(3)
        .cluster(
            ClusterConfig::new()
                .replicas(3)
                .propagation_delay(Duration::from_millis(2))
                .propagation_jitter(Duration::from_millis(2)),
        )
        .retry(RetryConfig {
            delay_ms: 1,
            precondition_delay_ms: 1,
            ..RetryConfig::default()
        })
        .check(CheckConfig {
            attempts: 6,
            backoff_step_ms: 10,
        })
        .load(LoadConfig {
            workers: 2,
            selects: 2,
            updates: 1,
            cycle_time_ms: 6,
        })
}

#[test]
fn every_strategy_runs_with_background_load() {
    let bench = Benchmark::new(
        config()
            .strategies(StrategyKind::ALL)
            .coordinator(CoordinatorConfig {
                heartbeat_ms: 50,
                ..CoordinatorConfig::default()
            }),
    )
    .unwrap();
    let reports = bench.run_all().unwrap();

    assert_eq!(reports.len(), 4);
    for (report, kind) in reports.iter().zip(StrategyKind::ALL) {
        assert_eq!(report.summary.solution, kind.as_str());
        assert_eq!(report.summary.ok, 9, "{}", report.summary);
        assert_eq!(report.summary.errors, 0);
        assert_eq!(report.load.len(), 2);
        assert!(report.worker_errors.is_empty());
    }

    // background records are removed when the load stops
    assert_eq!(bench.cluster().record_count(), 1);
}

#[test]
fn overrides_reach_individual_workers() {
    let bench = Benchmark::new(config().records(2)).unwrap();
    let overrides = Overrides::Finite(vec![
        WorkerOverrides {
            iterations: Some(1),
            ..WorkerOverrides::default()
        },
        WorkerOverrides {
            record_index: Some(1),
            profile: Some(true),
            ..WorkerOverrides::default()
        },
    ]);
    let report = bench.run(StrategyKind::ForUpdate, overrides).unwrap();

    let per_worker = |w: usize| report.points.iter().filter(|p| p.worker == w).count();
    assert_eq!(per_worker(0), 1);
    assert_eq!(per_worker(1), 3);
    assert_eq!(per_worker(2), 3);
    assert!(report.points.iter().filter(|p| p.worker == 1).all(|p| p.profile.is_some()));
    assert!(report.summary.profile.contains_key("select_for_update"));
}

#[test]
fn summary_reports_retry_counters() {
    let no_load = LoadConfig {
        workers: 0,
        ..LoadConfig::default()
    };
    let bench = Benchmark::new(config().workers(1).load(no_load)).unwrap();
    bench.cluster().faults().inject(
        rowbench::storage::FaultPoint::UpdateWhere,
        rowbench::core::StoreError::deadlock(),
        2,
    );
    let report = bench.run(StrategyKind::UpdateWithWhere, Overrides::None).unwrap();
    let deadlock = report.summary.stat("deadlock").unwrap();
    assert_eq!(deadlock.sum, 2.0);
    assert!(report.summary.to_string().contains("deadlock"));
}
