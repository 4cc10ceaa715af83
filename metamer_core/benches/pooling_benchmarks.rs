//! Performance benchmarks for window construction, pooling and synthesis
//!
//! Run with: cargo bench --bench pooling_benchmarks

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use foveated_metamer_core::{
    CorticalModel, InitialImageType, MetamerSynthesis, PoolingOperator, RetinalModel,
    SynthesisConfig, VisualModel, WindowBank, WindowCache, WindowParams,
};
use ndarray::Array2;

fn textured(size: usize) -> Array2<f32> {
    Array2::from_shape_fn((size, size), |(r, c)| {
        0.5 + 0.4 * ((r as f32 * 0.3).sin() * (c as f32 * 0.2).cos())
    })
}

/// Benchmark window bank construction at several resolutions
fn bench_window_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_build");
    group.sample_size(10);

    for size in [64usize, 128, 256].iter() {
        let params = WindowParams::new(0.5, (*size, *size));
        group.bench_with_input(BenchmarkId::new("cosine", size), size, |b, _| {
            b.iter(|| black_box(WindowBank::build(&params).expect("bank")));
        });
    }

    group.finish();
}

/// Benchmark forward pooling and its adjoint
fn bench_pooling(c: &mut Criterion) {
    let mut group = c.benchmark_group("pooling");

    for size in [64usize, 128, 256].iter() {
        let params = WindowParams::new(0.5, (*size, *size));
        let pooling = PoolingOperator::new(Arc::new(WindowBank::build(&params).expect("bank")));
        let image = textured(*size);
        let grad = ndarray::Array1::from_elem(pooling.num_windows(), 1.0f32);

        group.bench_with_input(BenchmarkId::new("forward", size), size, |b, _| {
            b.iter(|| black_box(pooling.pool_image(image.view()).expect("pool")));
        });
        group.bench_with_input(BenchmarkId::new("backward", size), size, |b, _| {
            b.iter(|| black_box(pooling.backward_scale(0, grad.view()).expect("adjoint")));
        });
    }

    group.finish();
}

/// Benchmark the cortical forward pass (pyramid plus pooling)
fn bench_cortical_forward(c: &mut Criterion) {
    let cache = WindowCache::default();
    let model = CorticalModel::new(WindowParams::new(0.5, (128, 128)).with_num_scales(3), 3, &cache)
        .expect("model");
    let image = textured(128);

    c.bench_function("cortical_forward_128", |b| {
        b.iter(|| black_box(model.forward(image.view()).expect("forward")));
    });
}

/// Benchmark a single synthesis iteration
fn bench_synthesis_step(c: &mut Criterion) {
    let cache = WindowCache::default();
    let model = RetinalModel::new(WindowParams::new(0.5, (128, 128)), &cache).expect("model");
    let reference = textured(128);
    let config = SynthesisConfig {
        initial_image: InitialImageType::Pink,
        max_iter: usize::MAX,
        loss_threshold: 0.0,
        ..Default::default()
    };
    let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).expect("init");

    c.bench_function("retinal_synthesis_step_128", |b| {
        b.iter(|| black_box(synthesis.step().expect("step")));
    });
}

criterion_group!(
    benches,
    bench_window_build,
    bench_pooling,
    bench_cortical_forward,
    bench_synthesis_step
);
criterion_main!(benches);
