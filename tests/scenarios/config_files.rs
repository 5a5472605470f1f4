//! Configuration File Tests
//!
//! TOML files drive the runner end to end.

use rowbench::concurrency::{LeaseScope, StrategyKind};
use rowbench::{BenchConfig, Benchmark, CoordinatorBackend, Error};
use std::fs;

const BENCH_TOML: &str = r#"
workers = 2
records = 1

[worker]
iterations = 2

[cluster]
replicas = 2
propagation_delay_ms = 1
propagation_jitter_ms = 0

[retry]
delay_ms = 1
precondition_delay_ms = 1

[check]
backoff_step_ms = 5

[load]
workers = 1
cycle_time_ms = 5

[strategy]
kinds = ["update_with_where", "coordinated_for_update"]
lease_scope = "hold_until_released"

[coordinator]
backend = "file"
ttl_ms = 5000
heartbeat_ms = 100
"#;

#[test]
fn file_backed_config_runs_every_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let locks = dir.path().join("locks");
    let text = format!("{}dir = {:?}\n", BENCH_TOML, locks.display().to_string());
    let path = dir.path().join("bench.toml");
    fs::write(&path, text).unwrap();

    let config = BenchConfig::from_path(&path).unwrap();
    assert_eq!(config.coordinator.backend, CoordinatorBackend::File);
    assert_eq!(config.strategy.lease_scope, LeaseScope::HoldUntilReleased);
    assert_eq!(
        config.strategy.kinds,
        vec![StrategyKind::UpdateWithWhere, StrategyKind::CoordinatedForUpdate]
    );

    let reports = Benchmark::new(config).unwrap().run_all().unwrap();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.summary.ok, 4, "{}", report.summary);
    }
    assert!(locks.is_dir());
}

#[test]
fn file_backend_without_dir_is_rejected() {
    let err = BenchConfig::from_toml_str(BENCH_TOML).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("coordinator.dir")));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "workers = \"many\"").unwrap();
    let err = BenchConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert!(err.is_config());
}
