//! Strategy Contention Benchmarks
//!
//! ## Benchmark Path Types
//!
//! - `cycle/*`: one `available -> deleting -> available` cycle per iteration,
//!   no consistency check, zero replication delay
//! - `contended/*`: N threads cycling the same record
//! - `disjoint/*`: N threads, one record each
//!
//! ## What These Benchmarks Show
//!
//! | Benchmark | Measures |
//! |-----------|----------|
//! | cycle/{strategy} | Fixed cost of a strategy's statements and lease calls |
//! | contended/{strategy}/{threads} | Cost of losing: precondition waits, lock waits |
//! | disjoint/{strategy}/{threads} | Lease and lock table overhead without real conflicts |
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench strategy_contention
//! cargo bench --bench strategy_contention -- "contended"  # specific group
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rowbench::concurrency::{
    CoordinatorService, LeaseConfig, PreconditionWait, RetryPolicy, StrategyFactory, StrategyKind,
    TransitionStrategy,
};
use rowbench::core::{status, RecordId, ReplicaId, Session, TransitionAttempt};
use rowbench::storage::{Cluster, ClusterConfig};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const THREAD_COUNTS: [usize; 3] = [2, 4, 8];

// =============================================================================
// Utilities - setup happens here, outside timed loops
// =============================================================================

fn cluster() -> Cluster {
    Cluster::new(
        ClusterConfig::new()
            .replicas(3)
            .propagation_delay(Duration::ZERO)
            .propagation_jitter(Duration::ZERO),
    )
    .unwrap()
}

fn factory(kind: StrategyKind) -> StrategyFactory {
    StrategyFactory::new(kind)
        .retry_policy(RetryPolicy::new().with_delay(Duration::from_micros(100)))
        .precondition_wait(PreconditionWait::new().with_delay(Duration::from_micros(100)))
        .coordinator(CoordinatorService::ipc())
        .lease_config(
            LeaseConfig::default()
                .retry_delay(Duration::from_micros(100))
                .heartbeat_interval(Duration::ZERO),
        )
}

fn cycle(
    strategy: &mut dyn TransitionStrategy,
    session: &mut dyn Session,
    record: &RecordId,
    marker: String,
) {
    let forward = TransitionAttempt::new(record.clone(), status::AVAILABLE, status::DELETING, marker);
    strategy.transition(session, &forward).unwrap();
    strategy.transition(session, &forward.reversed()).unwrap();
}

/// Run `iters` cycles split over `threads`, each on `record_for(thread)`
fn threaded(
    kind: StrategyKind,
    threads: usize,
    iters: u64,
    record_for: impl Fn(usize, &[RecordId]) -> RecordId,
    records: usize,
) -> Duration {
    let cluster = cluster();
    let ids = cluster.populate(records).unwrap();
    let factory = factory(kind);
    let barrier = Arc::new(Barrier::new(threads + 1));
    let per_thread = (iters / threads as u64).max(1);

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let mut session = cluster.open_session(ReplicaId(t % 3));
            let mut strategy = factory.build().unwrap();
            let record = record_for(t, &ids);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    cycle(strategy.as_mut(), &mut session, &record, format!("{}_{}", t, i));
                }
            })
        })
        .collect();

    barrier.wait();
    let start = Instant::now();
    for handle in handles {
        handle.join().unwrap();
    }
    start.elapsed()
}

// =============================================================================
// Single-threaded cycle cost
// =============================================================================

fn cycle_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");
    group.throughput(Throughput::Elements(1));

    for kind in StrategyKind::ALL {
        let cluster = cluster();
        let record = cluster.populate(1).unwrap().remove(0);
        let mut session = cluster.open_session(ReplicaId(0));
        let mut strategy = factory(kind).build().unwrap();
        let mut i = 0u64;

        group.bench_function(kind.as_str(), |b| {
            b.iter(|| {
                i += 1;
                cycle(strategy.as_mut(), &mut session, &record, format!("0_{}", i));
            });
        });
    }

    group.finish();
}

// =============================================================================
// Same record, N threads
// =============================================================================

fn contended_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");
    group.throughput(Throughput::Elements(1));

    for kind in StrategyKind::ALL {
        for threads in THREAD_COUNTS {
            group.bench_with_input(
                BenchmarkId::new(kind.as_str(), threads),
                &threads,
                |b, &threads| {
                    b.iter_custom(|iters| threaded(kind, threads, iters, |_, ids| ids[0].clone(), 1));
                },
            );
        }
    }

    group.finish();
}

// =============================================================================
// One record per thread
// =============================================================================

fn disjoint_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("disjoint");
    group.throughput(Throughput::Elements(1));

    for kind in StrategyKind::ALL {
        for threads in THREAD_COUNTS {
            group.bench_with_input(
                BenchmarkId::new(kind.as_str(), threads),
                &threads,
                |b, &threads| {
                    b.iter_custom(|iters| {
                        threaded(kind, threads, iters, |t, ids| ids[t].clone(), threads)
                    });
                },
            );
        }
    }

    group.finish();
}

// =============================================================================
// Benchmark Groups
// =============================================================================

criterion_group!(
    name = single;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = cycle_benchmarks
);

criterion_group!(
    name = threads;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(20);
    targets = contended_benchmarks, disjoint_benchmarks
);

criterion_main!(single, threads);
