//! Criterion benchmarks comparing inline and pooled experiment execution.

use cadence_bench::sweep_experiment;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_sweep_inline(c: &mut Criterion) {
    c.bench_function("sweep_16_inline", |b| {
        b.iter(|| black_box(sweep_experiment(50, 16, 0).execute().unwrap()));
    });
}

fn bench_sweep_pool(c: &mut Criterion) {
    c.bench_function("sweep_16_pool4", |b| {
        b.iter(|| black_box(sweep_experiment(50, 16, 4).execute().unwrap()));
    });
}

criterion_group!(benches, bench_sweep_inline, bench_sweep_pool);
criterion_main!(benches);
