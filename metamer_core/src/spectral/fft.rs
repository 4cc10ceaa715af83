//! Two-dimensional FFTs over `ndarray` matrices.
//!
//! Rows and columns are transformed with `rustfft` plans that are created
//! once per shape. Each row transform is independent, so rows are processed
//! in parallel without affecting the result.

use std::sync::Arc;

use ndarray::{Array2, Axis};
use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Forward and inverse 2-D transforms for one shape.
#[derive(Clone)]
pub struct Fft2 {
    shape: (usize, usize),
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Fft2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2").field("shape", &self.shape).finish()
    }
}

impl Fft2 {
    pub fn new(shape: (usize, usize)) -> Self {
        let (rows, cols) = shape;
        let mut planner = FftPlanner::new();
        Self {
            shape,
            row_forward: planner.plan_fft_forward(cols),
            row_inverse: planner.plan_fft_inverse(cols),
            col_forward: planner.plan_fft_forward(rows),
            col_inverse: planner.plan_fft_inverse(rows),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Unnormalized forward transform.
    pub fn forward(&self, data: &Array2<Complex64>) -> Array2<Complex64> {
        self.transform(data, &self.row_forward, &self.col_forward)
    }

    /// Unnormalized inverse transform (no `1/N` factor).
    pub fn inverse_unnormalized(&self, data: &Array2<Complex64>) -> Array2<Complex64> {
        self.transform(data, &self.row_inverse, &self.col_inverse)
    }

    /// Inverse transform scaled by `1/N`, so `inverse(forward(x)) == x`.
    pub fn inverse(&self, data: &Array2<Complex64>) -> Array2<Complex64> {
        let n = (self.shape.0 * self.shape.1) as f64;
        let mut out = self.inverse_unnormalized(data);
        out.mapv_inplace(|v| v / n);
        out
    }

    /// Forward transform of a real matrix.
    pub fn forward_real(&self, data: &Array2<f64>) -> Array2<Complex64> {
        self.forward(&data.mapv(|v| Complex64::new(v, 0.0)))
    }

    fn transform(
        &self,
        data: &Array2<Complex64>,
        row_plan: &Arc<dyn Fft<f64>>,
        col_plan: &Arc<dyn Fft<f64>>,
    ) -> Array2<Complex64> {
        debug_assert_eq!(data.dim(), self.shape);
        let mut rows = data.as_standard_layout().into_owned();
        process_rows(&mut rows, row_plan);
        let mut cols = rows.reversed_axes().as_standard_layout().into_owned();
        process_rows(&mut cols, col_plan);
        cols.reversed_axes().as_standard_layout().into_owned()
    }
}

fn process_rows(data: &mut Array2<Complex64>, plan: &Arc<dyn Fft<f64>>) {
    data.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| match row.as_slice_mut() {
            Some(slice) => plan.process(slice),
            None => {
                let mut buffer = row.to_vec();
                plan.process(&mut buffer);
                row.iter_mut().zip(buffer).for_each(|(dst, src)| *dst = src);
            }
        });
}

/// Moves the zero-frequency entry to the center: index `i` goes to
/// `(i + n/2) mod n` along each axis.
pub fn fftshift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (h, w) = data.dim();
    let (sh, sw) = (h / 2, w / 2);
    Array2::from_shape_fn((h, w), |(r, c)| {
        data[[(r + h - sh) % h, (c + w - sw) % w]].clone()
    })
}

/// Inverse of [`fftshift`].
pub fn ifftshift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (h, w) = data.dim();
    let (sh, sw) = (h / 2, w / 2);
    Array2::from_shape_fn((h, w), |(r, c)| data[[(r + sh) % h, (c + sw) % w]].clone())
}
