//! Transaction scheduler benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pkd_bench::random_package_ids;
use pkd_core::{Role, TransactionDb};
use pkd_daemon::{
    Clock, DaemonConfig, DummyBackend, Engine, EngineBuilder, ExecutionMode, ManualClock,
    RoleRequest,
};
use std::sync::Arc;
use std::time::Duration;

fn engine(manual: bool) -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let implementation = if manual {
        DummyBackend::manual().0
    } else {
        DummyBackend::new()
    };
    let engine = EngineBuilder::new(DaemonConfig::new().execution(ExecutionMode::Inline))
        .clock(clock.clone())
        .backend(Box::new(implementation))
        .build()
        .unwrap();
    (engine, clock)
}

fn drain(engine: &mut Engine, clock: &ManualClock) {
    engine.run_until_idle();
    while let Some(deadline) = engine.next_deadline() {
        if deadline > clock.now() + Duration::from_secs(1) {
            break;
        }
        clock.advance_to(deadline);
        engine.run_until_idle();
    }
}

/// Benchmark one resolve from id issuance to Finished.
fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    group.bench_function("resolve", |b| {
        let (mut engine, clock) = engine(false);
        b.iter(|| {
            let tid = engine.get_tid(":1.42").unwrap();
            engine
                .submit(
                    &tid,
                    RoleRequest::Resolve {
                        filter: "none".into(),
                        packages: vec!["powertop".into()],
                    },
                )
                .unwrap();
            drain(&mut engine, &clock);
            clock.advance(engine.config().timing.keep_finished);
            engine.poll_timers();
            black_box(tid);
        });
    });

    group.finish();
}

/// Benchmark queueing behind a running transaction.
fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    for depth in [10, 100] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::new("submit", depth), &depth, |b, &depth| {
            let ids = random_package_ids(depth);
            b.iter(|| {
                let (mut engine, _clock) = engine(true);
                for id in &ids {
                    let tid = engine.get_tid(":1.42").unwrap();
                    engine
                        .submit(
                            &tid,
                            RoleRequest::GetDetails {
                                package_ids: vec![id.clone()],
                            },
                        )
                        .unwrap();
                }
                black_box(engine.get_transaction_list());
            });
        });
    }

    group.finish();
}

/// Benchmark ledger writes and reads.
fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");

    group.bench_function("record", |b| {
        let mut db = TransactionDb::in_memory();
        b.iter(|| {
            let tid = db.generate_id();
            db.add(&tid, 1_700_000_000).unwrap();
            db.set_role(&tid, Role::InstallPackages).unwrap();
            db.set_finished(&tid, true, 1200).unwrap();
        });
    });

    for count in [100, 1000] {
        let mut db = TransactionDb::in_memory();
        for _ in 0..count {
            let tid = db.generate_id();
            db.add(&tid, 1_700_000_000).unwrap();
            db.set_role(&tid, Role::UpdateSystem).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("get_list", count), &db, |b, db| {
            b.iter(|| black_box(db.get_list(20)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_queue, bench_ledger);
criterion_main!(benches);
