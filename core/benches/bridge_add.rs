use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modelbridge_rs::{reference_add, ModelBridge, ReferenceTransport};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn bench_bridge_add(c: &mut Criterion) {
    let artifact = NamedTempFile::new().unwrap();
    let bridge = ModelBridge::open(artifact.path(), Arc::new(ReferenceTransport::new())).unwrap();

    let mut group = c.benchmark_group("bridge_add");
    for size in [1_000usize, 10_000, 100_000] {
        let a: Vec<f32> = (0..size).map(|i| (i % 100) as f32 * 0.01).collect();
        let b: Vec<f32> = (0..size).map(|i| (i % 7) as f32 * -0.5).collect();

        group.bench_with_input(BenchmarkId::new("bridge", size), &size, |bench, _| {
            bench.iter(|| black_box(bridge.add(black_box(&a), black_box(&b)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("reference", size), &size, |bench, _| {
            bench.iter(|| black_box(reference_add(black_box(&a), black_box(&b))));
        });
    }
    group.finish();
}

fn bench_batch_add(c: &mut Criterion) {
    let artifact = NamedTempFile::new().unwrap();
    let bridge = ModelBridge::open(artifact.path(), Arc::new(ReferenceTransport::new())).unwrap();

    let batch_a = vec![vec![1.0f32; 1024]; 16];
    let batch_b = vec![vec![2.0f32; 1024]; 16];

    c.bench_function("bridge_batch_add_16x1024", |b| {
        b.iter(|| black_box(bridge.batch_add(black_box(&batch_a), black_box(&batch_b)).unwrap()));
    });
}

criterion_group!(benches, bench_bridge_add, bench_batch_add);
criterion_main!(benches);
