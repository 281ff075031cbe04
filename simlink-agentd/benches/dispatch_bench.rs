use criterion::{black_box, criterion_group, criterion_main, Criterion};
use simlink_agentd::adapters::engine::SandboxWorld;
use simlink_agentd::app::dispatch::{CommandDispatcher, DispatcherOptions};
use simlink_agentd::app::stream::StreamManager;
use simlink_agentd::app::world::{EnvironmentService, ScanRequest};
use simlink_agentd::config::EnvironmentConfig;
use simlink_agentd::domain::world::{BlockPos, Position};
use std::sync::Arc;
use std::time::Duration;

fn start_dispatcher() -> CommandDispatcher {
    CommandDispatcher::start(
        Box::new(SandboxWorld::new()),
        DispatcherOptions::default(),
        None,
    )
    .unwrap()
}

fn dispatch_round_trip(c: &mut Criterion) {
    let dispatcher = start_dispatcher();

    c.bench_function("dispatch_round_trip_block_lookup", |b| {
        b.iter(|| {
            let pos = black_box(BlockPos::new(1, 63, 1));
            dispatcher
                .submit_blocking(move |engine| Ok(engine.block_at(pos)))
                .unwrap()
        })
    });
    dispatcher.shutdown(Duration::from_secs(1));
}

fn dispatch_pipelined(c: &mut Criterion) {
    let dispatcher = start_dispatcher();

    c.bench_function("dispatch_pipelined_64", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..64)
                .map(|i| {
                    dispatcher
                        .submit(move |engine| Ok(engine.block_at(BlockPos::new(i, 63, 0)).is_air))
                        .unwrap()
                })
                .collect();
            for handle in handles {
                black_box(handle.blocking_wait().unwrap());
            }
        })
    });
    dispatcher.shutdown(Duration::from_secs(1));
}

fn environment_scan(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dispatcher = Arc::new(start_dispatcher());
    let streams = Arc::new(StreamManager::new(dispatcher.clone(), None));
    let service = EnvironmentService::new(dispatcher.clone(), streams, EnvironmentConfig::default());
    let request = ScanRequest {
        center: Some(Position::new(0.5, 64.0, 0.5)),
        radius: 8,
        ..ScanRequest::default()
    };

    c.bench_function("environment_scan_radius_8", |b| {
        b.iter(|| runtime.block_on(service.scan(black_box(&request))).unwrap())
    });
    dispatcher.shutdown(Duration::from_secs(1));
}

criterion_group!(
    benches,
    dispatch_round_trip,
    dispatch_pipelined,
    environment_scan
);
criterion_main!(benches);
