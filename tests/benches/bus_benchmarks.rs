//! # Topic Bus Benchmarks
//!
//! | Benchmark | What it measures |
//! |-----------|------------------|
//! | `publish_no_subscribers` | Lock + map lookup cost of a publish nobody listens to |
//! | `fan_out` | Publish plus ordered delivery to N subscribers |
//! | `serializer_reorder` | Reordering a reversed burst through one Serializer |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tokio::runtime::Runtime;
use topic_bus::{Bus, BusConfig, Serializer};

const EVENTS: u64 = 256;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("runtime")
}

fn bench_publish_no_subscribers(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();
    let bus: Bus<u64> = Bus::new();

    c.bench_function("publish_no_subscribers", |b| {
        b.iter(|| bus.publish(black_box("empty"), black_box(1)))
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("fan_out");
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(EVENTS));

    for subscribers in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                b.to_async(&rt).iter(|| async move {
                    let bus: Bus<u64> =
                        Bus::with_config(BusConfig::default().with_queue_capacity(64))
                            .expect("config");
                    let mut receivers: Vec<_> =
                        (0..subscribers).map(|_| bus.subscribe("bench")).collect();

                    for value in 0..EVENTS {
                        bus.publish("bench", value);
                    }
                    for (receiver, _unsubscribe) in receivers.iter_mut() {
                        for _ in 0..EVENTS {
                            black_box(receiver.recv().await);
                        }
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_serializer_reorder(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("serializer_reorder", |b| {
        b.to_async(&rt).iter(|| async {
            let serializer = Serializer::new();
            for sequence in (0..EVENTS).rev() {
                serializer
                    .execute(async move { black_box(sequence); }, sequence)
                    .await;
            }
        })
    });
}

criterion_group!(
    benches,
    bench_publish_no_subscribers,
    bench_fan_out,
    bench_serializer_reorder
);
criterion_main!(benches);
