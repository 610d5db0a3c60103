//! Ingest benchmarks for threadbox.
//!
//! These benchmarks measure how fast the router files messages into threads.
//! Every iteration starts from a fresh router so thread logs and observer
//! queues stay bounded.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use threadbox_core::{Message, MessageRouter, Observer};

const JSON_PAYLOAD: &[u8] = br#"{"sender":"alice","message":"hello from the bench"}"#;

/// Messages ingested per iteration.
const BATCH: usize = 1_000;

/// Benchmark payload decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    group.throughput(Throughput::Bytes(JSON_PAYLOAD.len() as u64));
    group.bench_function("json", |b| {
        b.iter(|| Message::from_payload(1, black_box(JSON_PAYLOAD), 0))
    });

    let plain = vec![b'x'; 256];
    group.throughput(Throughput::Bytes(plain.len() as u64));
    group.bench_function("plain_256B", |b| {
        b.iter(|| Message::from_payload(1, black_box(&plain), 0))
    });

    group.finish();
}

/// Benchmark router ingest.
fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("single_topic", |b| {
        b.iter_batched(
            MessageRouter::new,
            |router| {
                for _ in 0..BATCH {
                    router.ingest(black_box(JSON_PAYLOAD), "bench", 0);
                }
                router
            },
            BatchSize::SmallInput,
        );
    });

    let topics: Vec<String> = (0..BATCH).map(|i| format!("topic/{}", i)).collect();
    group.bench_function("new_topic_each", |b| {
        b.iter_batched(
            MessageRouter::new,
            |router| {
                for topic in &topics {
                    router.ingest(black_box(JSON_PAYLOAD), topic, 0);
                }
                router
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn router_with_observers(observers: usize) -> (MessageRouter, Vec<Observer>) {
    let router = MessageRouter::new();
    router.open_view("bench");
    let observers = (0..observers).map(|_| router.subscribe()).collect();
    (router, observers)
}

/// Benchmark live fan-out to many observers.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for size in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements((BATCH * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || router_with_observers(size),
                |(router, observers)| {
                    for _ in 0..BATCH {
                        router.ingest(black_box(JSON_PAYLOAD), "bench", 0);
                    }
                    (router, observers)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark list snapshots.
fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("list");

    for threads in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("summaries", threads), threads, |b, &threads| {
            let router = MessageRouter::new();
            for t in 0..threads {
                for _ in 0..10 {
                    router.ingest(JSON_PAYLOAD, &format!("topic/{}", t), 0);
                }
            }

            b.iter(|| black_box(router.thread_summaries()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_ingest, bench_fanout, bench_list);
criterion_main!(benches);
