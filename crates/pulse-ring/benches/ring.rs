//! Ring buffer benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pulse_ring::{MpscRing, SpscRing};

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc");
    group.throughput(Throughput::Elements(1));

    group.bench_function("try_push_try_pop", |b| {
        let ring: SpscRing<u64> = SpscRing::with_capacity(1024).unwrap();
        b.iter(|| {
            black_box(ring.try_push(42));
            black_box(ring.try_pop());
        })
    });

    group.bench_function("prefetch_push_pop", |b| {
        let ring: SpscRing<u64> = SpscRing::with_capacity(1024).unwrap();
        b.iter(|| {
            black_box(ring.try_push_with_prefetch(42));
            black_box(ring.try_pop_with_prefetch());
        })
    });

    group.finish();
}

fn bench_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_bulk");
    group.throughput(Throughput::Elements(64));

    group.bench_function("push_pop_64", |b| {
        let ring: SpscRing<u64> = SpscRing::with_capacity(1024).unwrap();
        let src: Vec<u64> = (0..64).collect();
        let mut dst = [0u64; 64];
        b.iter(|| {
            black_box(ring.try_push_bulk(&src));
            black_box(ring.try_pop_bulk(&mut dst));
        })
    });

    group.finish();
}

fn bench_mpsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpsc");
    group.throughput(Throughput::Elements(1));

    group.bench_function("uncontended_push_pop", |b| {
        let ring: MpscRing<u64> = MpscRing::with_capacity(1024).unwrap();
        b.iter(|| {
            black_box(ring.try_push(42));
            black_box(ring.try_pop());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_bulk, bench_mpsc);
criterion_main!(benches);
