use std::{sync::Arc, thread};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tandem::{
    BridgeConfig, ContinuousSide, Coupling, EngineId, PortDescriptor, PortDirection, SignalKind,
    StepLocation, StepSync, TimeBarrier,
};

fn coupling_with_outputs(ports: usize) -> Coupling {
    let coupling = Coupling::new(&BridgeConfig::new("bench.cir", ["tb"])).unwrap();
    for i in 0..ports {
        let desc = PortDescriptor::new(
            format!("out{i}"),
            PortDirection::ContinuousDrivesDiscrete,
            SignalKind::Net,
        );
        coupling.registry.register_port(&desc).unwrap();
    }
    coupling
}

// End-of-step refresh followed by the discrete-side drain, with every port moving each step
fn bench_refresh_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_and_drain");

    for ports in [1usize, 16, 256].iter() {
        group.throughput(Throughput::Elements(*ports as u64));
        group.bench_with_input(BenchmarkId::new("ports", ports), ports, |b, &ports| {
            let coupling = coupling_with_outputs(ports);
            let side: ContinuousSide = coupling.continuous_side();
            let mut step = 0u64;
            b.iter(|| {
                step += 1;
                let level = (step % 2) as f64;
                let probe = move |_: &str| Some(level);
                let sync = StepSync {
                    time: step as f64 * 1e-9,
                    delta: 1e-9,
                    old_delta: 1e-9,
                    redo_step: false,
                    location: StepLocation::End,
                };
                side.on_step_sync(&sync, &probe);
                black_box(coupling.registry.drain_changed(PortDirection::ContinuousDrivesDiscrete));
            });
        });
    }

    group.finish();
}

// Lock-step rendezvous of two threads through the barrier
fn bench_barrier_ping_pong(c: &mut Criterion) {
    let mut group = c.benchmark_group("barrier_ping_pong");

    for rounds in [100u64, 1_000].iter() {
        group.throughput(Throughput::Elements(*rounds));
        group.bench_with_input(BenchmarkId::new("rounds", rounds), rounds, |b, &rounds| {
            b.iter(|| {
                let barrier = Arc::new(TimeBarrier::new());
                let peer = {
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        for t in 1..=rounds {
                            barrier.publish_and_wait(EngineId::Continuous, t);
                        }
                    })
                };
                for t in 1..=rounds {
                    barrier.publish_and_wait(EngineId::Discrete, t);
                }
                peer.join().unwrap();
                black_box(barrier.read_time(EngineId::Continuous));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_refresh_and_drain, bench_barrier_ping_pong);
criterion_main!(benches);
