#[macro_use]
extern crate criterion;

use robust_hash::dct::{self, Coefficients, ImageBlock, OutputSize};

use rustdct::{Dct2, DctPlanner};

use criterion::{BenchmarkId, Criterion};

use std::hint::black_box;

fn transpose(size: usize, input: &[f64], output: &mut [f64]) {
    for (row, chunk) in input.chunks_exact(size).enumerate() {
        for (col, &val) in chunk.iter().enumerate() {
            output[col * size + row] = val;
        }
    }
}

/// Unnormalized 2D DCT-II with FFT-backed row transforms, transposing between passes.
fn rustdct_2d<D: Dct2<f64> + ?Sized>(dct: &D, size: usize, data: &mut [f64], scratch: &mut [f64]) {
    for row in data.chunks_exact_mut(size) {
        dct.process_dct2(row);
    }
    transpose(size, data, scratch);

    for row in scratch.chunks_exact_mut(size) {
        dct.process_dct2(row);
    }
    transpose(size, scratch, data);
}

fn compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("dct_2d");
    let mut planner = DctPlanner::<f64>::new();

    for size in [8usize, 16, 32, 64] {
        let grid = ImageBlock::from_fn(size, |row, col| ((row * 7 + col * 13) % 256) as u8);
        let coeffs = Coefficients::precompute(size);

        group.bench_with_input(BenchmarkId::new("ours", size), &grid, |b, grid| {
            b.iter(|| dct::transform(black_box(grid), &coeffs, OutputSize::Full))
        });

        let dct = planner.plan_dct2(size);
        let signal: Vec<f64> = grid.as_slice().iter().map(|&v| v as f64).collect();
        let mut data = signal.clone();
        let mut scratch = vec![0f64; size * size];

        group.bench_with_input(BenchmarkId::new("rustdct", size), &signal, |b, signal| {
            b.iter(|| {
                data.copy_from_slice(signal);
                rustdct_2d(&*dct, size, &mut data, &mut scratch);
                black_box(&data);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, compare);
criterion_main!(benches);
