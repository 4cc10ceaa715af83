//! Pooling operator
//!
//! Applies a [`WindowBank`] to images and per-scale coefficient maps. Product
//! windows `angular[a] * eccentricity[e]` are compressed once into sparse
//! rows with the normalization `1 / sum(window)` folded into the weights, so
//! pooling a constant map returns that constant. The transposed rows are kept
//! as well, which makes the backward pass a per-pixel gather.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::error::{MetamerError, MetamerResult};
use crate::windows::geometry::nearest_pixel;
use crate::windows::WindowBank;

/// Window mass below which a window is treated as empty.
const DEGENERATE_MASS: f64 = 1e-9;

/// Compressed sparse rows.
#[derive(Debug, Clone, Default, PartialEq)]
struct SparseRows {
    offsets: Vec<usize>,
    indices: Vec<u32>,
    weights: Vec<f32>,
}

impl SparseRows {
    fn from_rows(rows: Vec<Vec<(u32, f32)>>) -> Self {
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        let nnz = rows.iter().map(Vec::len).sum();
        let mut indices = Vec::with_capacity(nnz);
        let mut weights = Vec::with_capacity(nnz);
        for row in rows {
            for (index, weight) in row {
                indices.push(index);
                weights.push(weight);
            }
            offsets.push(indices.len());
        }
        Self {
            offsets,
            indices,
            weights,
        }
    }

    fn n_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    fn nnz(&self) -> usize {
        self.indices.len()
    }

    fn transpose(&self, n_cols: usize) -> Self {
        let mut rows: Vec<Vec<(u32, f32)>> = vec![Vec::new(); n_cols];
        for row in 0..self.n_rows() {
            for k in self.offsets[row]..self.offsets[row + 1] {
                rows[self.indices[k] as usize].push((row as u32, self.weights[k]));
            }
        }
        Self::from_rows(rows)
    }

    /// `out[r] = sum_k w[r,k] * x[idx[r,k]]`, one independent row per task.
    fn gather(&self, x: &[f32]) -> Vec<f32> {
        (0..self.n_rows())
            .into_par_iter()
            .map(|row| {
                let mut acc = 0.0f64;
                for k in self.offsets[row]..self.offsets[row + 1] {
                    acc += self.weights[k] as f64 * x[self.indices[k] as usize] as f64;
                }
                acc as f32
            })
            .collect()
    }
}

/// Sparse pooling plan for one scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalePooling {
    resolution: (usize, usize),
    windows: SparseRows,
    pixels: SparseRows,
    degenerate_windows: usize,
}

impl ScalePooling {
    pub fn resolution(&self) -> (usize, usize) {
        self.resolution
    }

    /// Windows with no support at this resolution, pooled from the single
    /// pixel nearest their center.
    pub fn degenerate_windows(&self) -> usize {
        self.degenerate_windows
    }

    /// Stored (nonzero) weights across all windows of this scale.
    pub fn nonzeros(&self) -> usize {
        self.windows.nnz()
    }
}

/// Pools images and coefficient maps with a shared window bank.
#[derive(Debug, Clone)]
pub struct PoolingOperator {
    bank: Arc<WindowBank>,
    scales: Vec<ScalePooling>,
}

impl PoolingOperator {
    pub fn new(bank: Arc<WindowBank>) -> Self {
        let scales = (0..bank.num_scales())
            .map(|scale| build_scale_plan(&bank, scale))
            .collect();
        Self { bank, scales }
    }

    pub fn bank(&self) -> &Arc<WindowBank> {
        &self.bank
    }

    pub fn num_windows(&self) -> usize {
        self.bank.num_windows()
    }

    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    pub fn scale_plan(&self, scale: usize) -> Option<&ScalePooling> {
        self.scales.get(scale)
    }

    pub fn degenerate_windows(&self) -> usize {
        self.scales.iter().map(|s| s.degenerate_windows).sum()
    }

    /// Pools a full-resolution image: one value per window.
    pub fn pool_image(&self, image: ArrayView2<'_, f32>) -> MetamerResult<Array1<f32>> {
        self.pool_scale(0, image)
    }

    /// Pools one map sampled at scale `scale`'s resolution.
    pub fn pool_scale(&self, scale: usize, map: ArrayView2<'_, f32>) -> MetamerResult<Array1<f32>> {
        let plan = self.plan(scale)?;
        check_shape(plan.resolution, map.dim(), "pooling")?;
        let data = contiguous(map);
        Ok(Array1::from(plan.windows.gather(&data)))
    }

    /// Pools band maps given as `bands[scale][orientation]`. The result is
    /// scale-major, then orientation, then window.
    pub fn pool_bands(&self, bands: &[Vec<Array2<f32>>]) -> MetamerResult<Array1<f32>> {
        let n_windows = self.num_windows();
        let total: usize = bands.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total * n_windows);
        for (scale, maps) in bands.iter().enumerate() {
            for map in maps {
                out.extend(self.pool_scale(scale, map.view())?.iter().copied());
            }
        }
        Ok(Array1::from(out))
    }

    /// Adjoint of [`PoolingOperator::pool_scale`]: spreads per-window
    /// gradients back onto the pixels of scale `scale`.
    pub fn backward_scale(&self, scale: usize, grad: ArrayView1<'_, f32>) -> MetamerResult<Array2<f32>> {
        let plan = self.plan(scale)?;
        if grad.len() != self.num_windows() {
            return Err(MetamerError::shape_mismatch(
                (self.num_windows(), 1),
                (grad.len(), 1),
                "pooling backward",
            ));
        }
        let data = grad.to_vec();
        let pixels = plan.pixels.gather(&data);
        Array2::from_shape_vec(plan.resolution, pixels).map_err(|err| {
            MetamerError::config("resolution", format!("{:?}", plan.resolution), err.to_string())
        })
    }

    /// Adjoint of [`PoolingOperator::pool_bands`] for `n_orientations`
    /// bands per scale.
    pub fn backward_bands(
        &self,
        grad: ArrayView1<'_, f32>,
        n_orientations: usize,
    ) -> MetamerResult<Vec<Vec<Array2<f32>>>> {
        let n_windows = self.num_windows();
        let expected = self.num_scales() * n_orientations * n_windows;
        if grad.len() != expected {
            return Err(MetamerError::shape_mismatch(
                (expected, 1),
                (grad.len(), 1),
                "band pooling backward",
            ));
        }
        (0..self.num_scales())
            .map(|scale| {
                (0..n_orientations)
                    .map(|band| {
                        let start = (scale * n_orientations + band) * n_windows;
                        let slice = grad.slice(ndarray::s![start..start + n_windows]);
                        self.backward_scale(scale, slice)
                    })
                    .collect()
            })
            .collect()
    }

    fn plan(&self, scale: usize) -> MetamerResult<&ScalePooling> {
        self.scales.get(scale).ok_or_else(|| {
            MetamerError::config(
                "scale",
                scale,
                format!("window bank only has {} scale(s)", self.scales.len()),
            )
        })
    }
}

pub(crate) fn check_shape(
    expected: (usize, usize),
    got: (usize, usize),
    context: &str,
) -> MetamerResult<()> {
    if expected != got {
        return Err(MetamerError::shape_mismatch(expected, got, context));
    }
    Ok(())
}

fn contiguous(map: ArrayView2<'_, f32>) -> Vec<f32> {
    match map.as_slice() {
        Some(slice) => slice.to_vec(),
        None => map.iter().copied().collect(),
    }
}

fn build_scale_plan(bank: &WindowBank, scale: usize) -> ScalePooling {
    let windows = &bank.scales()[scale];
    let (h, w) = windows.resolution;
    let n_pixels = h * w;
    let n_polar = bank.n_polar_windows();
    let geometry = bank.geometry();
    let max_ecc = bank.params().max_eccentricity;

    let rows: Vec<(Vec<(u32, f32)>, bool)> = (0..bank.num_windows())
        .into_par_iter()
        .map(|index| {
            let band = index / n_polar;
            let angle = index % n_polar;
            let ecc_mask = windows.eccentricity.index_axis(ndarray::Axis(0), band);
            let ang_mask = windows.angular.index_axis(ndarray::Axis(0), angle);
            let mut row = Vec::new();
            let mut mass = 0.0f64;
            for (pixel, (&e, &a)) in ecc_mask.iter().zip(ang_mask.iter()).enumerate() {
                let value = e as f64 * a as f64;
                if value > 0.0 {
                    mass += value;
                    row.push((pixel as u32, value));
                }
            }
            if mass < DEGENERATE_MASS {
                let (ecc, theta) = geometry.window_center(index);
                let (r, c) = nearest_pixel((h, w), max_ecc, ecc, theta);
                return (vec![((r * w + c) as u32, 1.0)], true);
            }
            let row = row
                .into_iter()
                .map(|(pixel, value)| (pixel, (value / mass) as f32))
                .collect();
            (row, false)
        })
        .collect();

    let degenerate_windows = rows.iter().filter(|(_, degenerate)| *degenerate).count();
    if degenerate_windows > 0 {
        tracing::warn!(
            scale,
            degenerate_windows,
            resolution = ?(h, w),
            "windows smaller than a pixel pool their center pixel"
        );
    }
    let window_rows = SparseRows::from_rows(rows.into_iter().map(|(row, _)| row).collect());
    let pixels = window_rows.transpose(n_pixels);

    ScalePooling {
        resolution: (h, w),
        windows: window_rows,
        pixels,
        degenerate_windows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windows::{WindowParams, WindowType};
    use ndarray::Array;

    fn operator(params: &WindowParams) -> PoolingOperator {
        PoolingOperator::new(Arc::new(WindowBank::build(params).expect("valid params")))
    }

    #[test]
    fn uniform_image_pools_to_its_value() {
        for wt in [WindowType::cosine(0.5), WindowType::gaussian(1.0)] {
            let op = operator(&WindowParams::new(0.5, (48, 48)).with_window_type(wt));
            let pooled = op.pool_image(Array2::from_elem((48, 48), 0.3).view()).expect("pool");
            assert_eq!(pooled.len(), op.num_windows());
            assert!(pooled.iter().all(|&v| (v - 0.3).abs() < 1e-5));
        }
    }

    #[test]
    fn coarse_scales_fall_back_to_center_pixel() {
        let params = WindowParams::new(0.3, (32, 32))
            .with_eccentricity_range(0.2, 15.0)
            .with_num_scales(4);
        let op = operator(&params);
        assert!(op.scale_plan(3).expect("scale").degenerate_windows() > 0);
        let map = Array2::from_elem((4, 4), 0.7);
        let pooled = op.pool_scale(3, map.view()).expect("pool");
        assert!(pooled.iter().all(|&v| (v - 0.7).abs() < 1e-5));
    }

    #[test]
    fn backward_is_the_adjoint() {
        let op = operator(&WindowParams::new(0.6, (24, 20)).with_num_scales(2));
        for scale in 0..2 {
            let (h, w) = op.scale_plan(scale).expect("scale").resolution();
            let x = Array::from_shape_fn((h, w), |(r, c)| ((r * 7 + c * 3) % 11) as f32 / 11.0);
            let g = Array::from_shape_fn(op.num_windows(), |i| ((i * 5) % 13) as f32 - 6.0);
            let lhs: f32 = op.pool_scale(scale, x.view()).expect("pool").dot(&g);
            let rhs: f32 = (&op.backward_scale(scale, g.view()).expect("backward") * &x).sum();
            assert!((lhs - rhs).abs() < 1e-3 * lhs.abs().max(1.0), "{lhs} vs {rhs}");
        }
    }

    #[test]
    fn band_order_is_scale_major() {
        let op = operator(&WindowParams::new(0.6, (24, 24)).with_num_scales(2));
        let bands: Vec<Vec<Array2<f32>>> = (0..2)
            .map(|scale| {
                let res = op.scale_plan(scale).expect("scale").resolution();
                (0..3)
                    .map(|o| Array2::from_elem(res, (scale * 3 + o) as f32))
                    .collect()
            })
            .collect();
        let pooled = op.pool_bands(&bands).expect("pool");
        let n = op.num_windows();
        assert_eq!(pooled.len(), 6 * n);
        for chunk in 0..6 {
            assert!((pooled[chunk * n] - chunk as f32).abs() < 1e-4);
            assert!((pooled[chunk * n + n - 1] - chunk as f32).abs() < 1e-4);
        }
        let grads = op.backward_bands(pooled.view(), 3).expect("backward");
        assert_eq!(grads.len(), 2);
        assert_eq!(grads[1][2].dim(), (12, 12));
    }

    #[test]
    fn wrong_resolution_is_rejected() {
        let op = operator(&WindowParams::new(0.5, (32, 32)));
        let err = op.pool_image(Array2::<f32>::zeros((32, 31)).view()).unwrap_err();
        assert!(err.is_shape_mismatch());
        let err = op.backward_scale(0, Array1::<f32>::zeros(3).view()).unwrap_err();
        assert!(err.is_shape_mismatch());
        assert!(op.pool_scale(5, Array2::<f32>::zeros((1, 1)).view()).is_err());
    }

    #[test]
    fn input_is_not_mutated() {
        let op = operator(&WindowParams::new(0.5, (32, 32)));
        let image = Array::from_shape_fn((32, 32), |(r, c)| (r + c) as f32 / 62.0);
        let before = image.clone();
        op.pool_image(image.view()).expect("pool");
        assert_eq!(image, before);
    }
}
