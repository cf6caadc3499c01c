//! Benchmarks for the queue and packet codec
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use devlink::datatype::{Buffer, FrameType, ImgFrame, NNData, TensorDataType};
use devlink::queue::{LockingQueue, StreamPacket};
use devlink::Message;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn bench_queue_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_pop");

    for capacity in [8usize, 120, 1024].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("overwrite", capacity),
            capacity,
            |b, &capacity| {
                let q = LockingQueue::new(capacity, true);
                for i in 0..capacity {
                    q.push(i).unwrap();
                }
                b.iter(|| {
                    q.push(black_box(1usize)).unwrap();
                    black_box(q.try_pop())
                });
            },
        );
    }

    group.finish();
}

fn bench_queue_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_handoff");
    const BATCH: usize = 10_000;
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("producer_consumer", |b| {
        b.iter(|| {
            let q = Arc::new(LockingQueue::new(120, false));
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..BATCH {
                        q.push(i).unwrap();
                    }
                })
            };
            for _ in 0..BATCH {
                black_box(q.wait_and_pop().unwrap());
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

fn sample_messages() -> Vec<(&'static str, Message)> {
    let mut nn = NNData::new();
    nn.add_layer("detections", TensorDataType::Fp16, vec![1, 1, 100, 7], vec![0; 1400]);
    vec![
        ("buffer_12b", Message::from(Buffer::new(vec![7; 12]))),
        (
            "frame_300x300",
            Message::from(ImgFrame::new(300, 300, FrameType::Bgr888p).with_data(vec![0; 270_000])),
        ),
        ("nn_100_det", Message::from(nn)),
    ]
}

fn bench_packet_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_codec");

    for (name, msg) in sample_messages() {
        let bytes = StreamPacket::serialize(&msg, Duration::from_millis(5)).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("serialize", name), &msg, |b, msg| {
            b.iter(|| StreamPacket::serialize(black_box(msg), Duration::from_millis(5)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("parse", name), &bytes, |b, bytes| {
            b.iter(|| StreamPacket::parse(black_box(bytes)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_push_pop,
    bench_queue_handoff,
    bench_packet_codec,
);
criterion_main!(benches);
