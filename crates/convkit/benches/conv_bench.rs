/// Criterion benchmarks for the 2D convolution kernels.
///
/// Compares the direct and im2col algorithms, serial and parallel, on a
/// few layer shapes typical of small CNNs.
///
/// Run: cargo bench --bench conv_bench
/// Reports saved to: target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use convkit::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// (label, input [N, C, H, W], weight [C_out, C_in, kH, kW], stride, padding)
const LAYERS: &[(&str, [usize; 4], [usize; 4], usize, usize)] = &[
    ("3x3_s1", [8, 16, 32, 32], [32, 16, 3, 3], 1, 1),
    ("3x3_s2", [8, 32, 32, 32], [64, 32, 3, 3], 2, 1),
    ("1x1", [8, 64, 16, 16], [64, 64, 1, 1], 1, 0),
];

fn engines() -> Vec<(&'static str, Conv2dEngine)> {
    let base = ConvConfig::default();
    vec![
        ("direct", Conv2dEngine::new(base.clone().algorithm(ConvAlgorithm::Direct))),
        ("im2col", Conv2dEngine::new(base.clone().algorithm(ConvAlgorithm::Im2col))),
        (
            "im2col_serial",
            Conv2dEngine::new(base.algorithm(ConvAlgorithm::Im2col).parallel(false)),
        ),
    ]
}

fn make_operands(x: [usize; 4], w: [usize; 4]) -> (Tensor<f32>, Tensor<f32>) {
    let mut rng = StdRng::seed_from_u64(42);
    let input = Tensor::rand_uniform(x, -1.0, 1.0, &mut rng).unwrap();
    let weight = Tensor::rand_uniform(w, -0.1, 0.1, &mut rng).unwrap();
    (input, weight)
}

fn bench_forward(c: &mut Criterion) {
    let _ = env_logger::try_init();
    let mut group = c.benchmark_group("conv2d_forward");
    group.sample_size(20);
    for &(label, xs, ws, stride, padding) in LAYERS {
        let (x, w) = make_operands(xs, ws);
        let params = ConvParams::square(stride, padding).unwrap();
        for (name, engine) in engines() {
            group.bench_with_input(BenchmarkId::new(name, label), &params, |b, &p| {
                b.iter(|| engine.forward(black_box(&x), black_box(&w), p).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv2d_backward");
    group.sample_size(20);
    for &(label, xs, ws, stride, padding) in LAYERS {
        let (x, w) = make_operands(xs, ws);
        let params = ConvParams::square(stride, padding).unwrap();
        let y = conv2d_forward(&x, &w, params).unwrap();
        let gy = Tensor::<f32>::ones(y.shape().clone()).unwrap();
        for (name, engine) in engines() {
            group.bench_with_input(BenchmarkId::new(name, label), &params, |b, &p| {
                b.iter(|| {
                    engine
                        .backward(black_box(&x), black_box(&gy), black_box(&w), p)
                        .unwrap()
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_forward, bench_backward);
criterion_main!(benches);
