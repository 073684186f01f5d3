// Copyright (c) 2026 The `robust_hash` Crate Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The forward DCT-II over a square intensity grid.
//!
//! The transform is computed directly from a precomputed cosine table rather than through a
//! fast transform: the grid is small and every hash only needs the low-frequency corner.
use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::fmt;

use crate::columns::{Columns, IndexLen};

/// Precomputed DCT basis values and per-frequency scale factors for an `N x N` grid.
///
/// Build this once and share it; [`Hasher`](crate::Hasher) keeps it behind an `Arc`.
#[derive(Clone, PartialEq)]
pub struct Coefficients {
    size: usize,
    /// `basis[i * size + j] = cos((2i + 1) / 2N * j * PI)`
    basis: Box<[f64]>,
    /// `scale[u * size + v] = norm(u) * norm(v) / 4`
    scale: Box<[f64]>,
}

impl Coefficients {
    /// Precompute the tables for a grid of `size x size` samples.
    ///
    /// The full `N x N` basis is computed even if only a low-frequency block is ever requested,
    /// so the same table serves [`OutputSize::Full`].
    ///
    /// ## Panics
    /// If `size` is zero.
    pub fn precompute(size: usize) -> Self {
        assert!(size > 0, "DCT grid size must be nonzero");

        let mut basis = vec![0f64; size * size];
        let mut scale = vec![0f64; size * size];

        for i in 0..size {
            for j in 0..size {
                let angle = (2 * i + 1) as f64 / (2 * size) as f64 * j as f64 * PI;
                basis[i * size + j] = angle.cos();
                scale[i * size + j] = norm(i) * norm(j) / 4.0;
            }
        }

        Coefficients {
            size,
            basis: basis.into_boxed_slice(),
            scale: scale.into_boxed_slice(),
        }
    }

    /// The grid size `N` these tables were built for.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The cosine basis value for sample index `i` at frequency `freq`.
    #[inline(always)]
    pub fn basis(&self, i: usize, freq: usize) -> f64 {
        self.basis[i * self.size + freq]
    }

    /// The normalization factor for frequency pair `(u, v)`.
    #[inline(always)]
    pub fn scale(&self, u: usize, v: usize) -> f64 {
        self.scale[u * self.size + v]
    }
}

impl fmt::Debug for Coefficients {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Coefficients").field("size", &self.size).finish_non_exhaustive()
    }
}

#[inline(always)]
fn norm(k: usize) -> f64 {
    if k == 0 {
        FRAC_1_SQRT_2
    } else {
        1.0
    }
}

/// A square grid of 8-bit grayscale samples, packed row-major.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageBlock {
    size: usize,
    samples: Box<[u8]>,
}

impl ImageBlock {
    /// Wrap `size * size` row-major samples. Returns `None` on a length mismatch.
    pub fn from_raw(size: usize, samples: Vec<u8>) -> Option<Self> {
        if size == 0 || samples.len() != size * size {
            return None;
        }

        Some(ImageBlock {
            size,
            samples: samples.into_boxed_slice(),
        })
    }

    /// Build a grid by evaluating `f(row, col)` for every sample.
    pub fn from_fn<F>(size: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> u8,
    {
        let samples = (0..size * size).map(|idx| f(idx / size, idx % size)).collect();
        ImageBlock { size, samples }
    }

    /// A grid with every sample set to `value`.
    pub fn uniform(size: usize, value: u8) -> Self {
        ImageBlock {
            size,
            samples: vec![value; size * size].into_boxed_slice(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.samples[row * self.size + col]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.samples
    }
}

/// A square block of DCT coefficients, packed row-major. Index `(0, 0)` is the DC term.
#[derive(Clone, Debug, PartialEq)]
pub struct DctBlock {
    size: usize,
    coeffs: Vec<f64>,
}

impl DctBlock {
    /// Wrap `size * size` precomputed coefficients. Returns `None` on a length mismatch.
    pub fn from_coefficients(size: usize, coeffs: Vec<f64>) -> Option<Self> {
        if size == 0 || coeffs.len() != size * size {
            return None;
        }

        Some(DctBlock { size, coeffs })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, u: usize, v: usize) -> f64 {
        self.coeffs[u * self.size + v]
    }

    /// The average-intensity term.
    pub fn dc(&self) -> f64 {
        self.coeffs[0]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.coeffs
    }
}

/// How much of the spectrum [`transform`] should produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputSize {
    /// All `N x N` frequencies.
    Full,
    /// Only the lowest `M x M` frequencies.
    LowFrequency(usize),
}

impl OutputSize {
    fn resolve(self, grid_size: usize) -> usize {
        match self {
            OutputSize::Full => grid_size,
            OutputSize::LowFrequency(size) => size,
        }
    }
}

/// Perform a 2D DCT-II on `grid`, returning the requested block of coefficients.
///
/// `coeff[u][v] = scale[u][v] * sum_i sum_j basis[i][u] * basis[j][v] * grid[i][j]`
///
/// The double sum is evaluated separably, rows then columns, always over the whole input grid.
///
/// ## Panics
/// If the grid size differs from the size `coeffs` was built for, or the requested output is
/// empty or larger than the grid.
pub fn transform(grid: &ImageBlock, coeffs: &Coefficients, output: OutputSize) -> DctBlock {
    let size = coeffs.size();
    assert_eq!(
        grid.size(),
        size,
        "grid is {0}x{0} but the coefficient table was built for {1}x{1}",
        grid.size(),
        size
    );

    let out_size = output.resolve(size);
    assert!(
        out_size > 0 && out_size <= size,
        "cannot produce a {0}x{0} DCT block from a {1}x{1} grid",
        out_size,
        size
    );

    let samples: Vec<f64> = grid.as_slice().iter().map(|&px| px as f64).collect();

    // row pass: `size` rows of `out_size` partial sums over `j`
    let mut row_pass = Vec::with_capacity(size * out_size);
    for row in samples.chunks(size) {
        row_pass.extend((0..out_size).map(|v| dot_basis(row, coeffs, v)));
    }

    // column pass: for each retained `v`, sum down the rows with the `u` basis
    let mut out = vec![0f64; out_size * out_size];
    for (v, col) in Columns::from_slice(&row_pass, out_size).enumerate() {
        for u in 0..out_size {
            out[u * out_size + v] = coeffs.scale(u, v) * dot_basis(&col, coeffs, u);
        }
    }

    DctBlock {
        size: out_size,
        coeffs: out,
    }
}

#[inline(always)]
fn dot_basis<I>(input: &I, coeffs: &Coefficients, freq: usize) -> f64
where
    I: IndexLen<Output = f64> + ?Sized,
{
    let mut sum = 0.0;

    for i in 0..input.len() {
        sum += input[i] * coeffs.basis(i, freq);
    }

    sum
}

#[cfg(test)]
mod test {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use rustdct::DctPlanner;

    use super::*;

    const EPSILON: f64 = 1e-9;

    fn random_grid(size: usize, seed: u64) -> ImageBlock {
        let mut rng = SmallRng::seed_from_u64(seed);
        ImageBlock::from_fn(size, |_, _| rng.gen())
    }

    /// The quadruple sum exactly as written in the formula, with no separation.
    fn naive_transform(grid: &ImageBlock, out_size: usize) -> Vec<f64> {
        let n = grid.size();
        let norm = |k: usize| if k == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        let basis =
            |i: usize, j: usize| ((2 * i + 1) as f64 / (2 * n) as f64 * j as f64 * PI).cos();

        let mut out = Vec::with_capacity(out_size * out_size);
        for u in 0..out_size {
            for v in 0..out_size {
                let mut sum = 0.0;
                for i in 0..n {
                    for j in 0..n {
                        sum += basis(i, u) * basis(j, v) * grid.get(i, j) as f64;
                    }
                }
                out.push(sum * norm(u) * norm(v) / 4.0);
            }
        }
        out
    }

    #[test]
    fn coefficient_tables() {
        let coeffs = Coefficients::precompute(32);

        assert_eq!(coeffs.size(), 32);
        assert!((coeffs.basis(0, 0) - 1.0).abs() < EPSILON);
        assert!((coeffs.basis(5, 0) - 1.0).abs() < EPSILON);
        assert!((coeffs.basis(0, 1) - (PI / 64.0).cos()).abs() < EPSILON);
        assert!((coeffs.scale(0, 0) - 0.125).abs() < EPSILON);
        assert!((coeffs.scale(0, 3) - FRAC_1_SQRT_2 / 4.0).abs() < EPSILON);
        assert!((coeffs.scale(2, 3) - 0.25).abs() < EPSILON);
    }

    #[test]
    fn separable_matches_direct_formula() {
        let coeffs = Coefficients::precompute(16);
        let grid = random_grid(16, 0xc0ffee);

        let dct = transform(&grid, &coeffs, OutputSize::LowFrequency(6));
        let expected = naive_transform(&grid, 6);

        assert_eq!(dct.size(), 6);
        for (got, want) in dct.as_slice().iter().zip(&expected) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
    }

    #[test]
    fn low_frequency_is_corner_of_full() {
        let coeffs = Coefficients::precompute(32);
        let grid = random_grid(32, 7);

        let full = transform(&grid, &coeffs, OutputSize::Full);
        let low = transform(&grid, &coeffs, OutputSize::LowFrequency(8));

        assert_eq!(full.size(), 32);
        for u in 0..8 {
            for v in 0..8 {
                assert!((full.get(u, v) - low.get(u, v)).abs() < EPSILON);
            }
        }
    }

    #[test]
    fn agrees_with_rustdct() {
        const SIZE: usize = 32;

        let coeffs = Coefficients::precompute(SIZE);
        let grid = random_grid(SIZE, 42);
        let ours = transform(&grid, &coeffs, OutputSize::Full);

        // unnormalized DCT-II over rows, then over columns
        let dct2 = DctPlanner::<f64>::new().plan_dct2(SIZE);
        let mut rows: Vec<f64> = grid.as_slice().iter().map(|&px| px as f64).collect();
        for row in rows.chunks_mut(SIZE) {
            dct2.process_dct2(row);
        }

        let mut column = vec![0f64; SIZE];
        let mut theirs = vec![0f64; SIZE * SIZE];
        for v in 0..SIZE {
            for i in 0..SIZE {
                column[i] = rows[i * SIZE + v];
            }
            dct2.process_dct2(&mut column);
            for u in 0..SIZE {
                theirs[u * SIZE + v] = column[u] * coeffs.scale(u, v);
            }
        }

        for (got, want) in ours.as_slice().iter().zip(&theirs) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
    }

    #[test]
    fn dc_term_is_scaled_sum() {
        let coeffs = Coefficients::precompute(32);
        let grid = ImageBlock::uniform(32, 128);

        let dct = transform(&grid, &coeffs, OutputSize::LowFrequency(8));

        // 0.5 / 4 * 1024 samples * 128
        assert!((dct.dc() - 128.0 * 1024.0 / 8.0).abs() < 1e-6);
        for &ac in &dct.as_slice()[1..] {
            assert!(ac.abs() < 1e-6, "AC coefficient {} of a flat grid", ac);
        }
    }

    #[test]
    fn deterministic() {
        let coeffs = Coefficients::precompute(32);
        let grid = random_grid(32, 99);

        let first = transform(&grid, &coeffs, OutputSize::LowFrequency(8));
        let second = transform(&grid, &coeffs, OutputSize::LowFrequency(8));

        assert_eq!(first, second);
    }

    #[test]
    #[should_panic(expected = "coefficient table")]
    fn wrong_grid_size_panics() {
        let coeffs = Coefficients::precompute(32);
        transform(&ImageBlock::uniform(16, 0), &coeffs, OutputSize::Full);
    }

    #[test]
    fn block_constructors_check_length() {
        assert!(ImageBlock::from_raw(4, vec![0; 15]).is_none());
        assert!(ImageBlock::from_raw(4, vec![0; 16]).is_some());
        assert!(DctBlock::from_coefficients(2, vec![0.0; 3]).is_none());

        let block = ImageBlock::from_fn(3, |row, col| (row * 3 + col) as u8);
        assert_eq!(block.get(2, 1), 7);
        assert_eq!(block.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
