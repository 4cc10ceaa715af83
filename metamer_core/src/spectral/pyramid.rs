//! Complex steerable pyramid built in the frequency domain.
//!
//! The decomposition splits an image into `num_scales` octave band-pass
//! scales with `order + 1` complex orientation bands each. Band `b` at scale
//! `s` has the resolution of window scale `s`. The high-pass and low-pass
//! residuals are computed implicitly and discarded; only the oriented bands
//! feed the representation.
//!
//! All masks are evaluated analytically and stored once, so the forward
//! transform and its adjoint share the exact same linear operator.

use std::f64::consts::PI;

use ndarray::{s, Array2};
use rustfft::num_complex::Complex64;

use super::fft::{fftshift, ifftshift, Fft2};
use crate::error::{MetamerError, MetamerResult};

/// Complex coefficients indexed `[scale][orientation]`.
pub type PyramidBands = Vec<Vec<Array2<Complex64>>>;

/// Largest number of scales supported for an image of `resolution`.
pub fn max_pyramid_height(resolution: (usize, usize)) -> usize {
    let min_dim = resolution.0.min(resolution.1).max(1);
    (min_dim.ilog2() as usize).saturating_sub(2)
}

/// Radial high-pass transition at `position`: 0 below `position - 1/2`, 1
/// above `position + 1/2`, `cos` ramp in between.
fn high_mask(log_rad: f64, position: f64) -> f64 {
    if log_rad <= position - 0.5 {
        0.0
    } else if log_rad >= position + 0.5 {
        1.0
    } else {
        ((PI / 2.0) * (log_rad - position) - PI / 4.0).cos()
    }
}

fn low_mask(log_rad: f64, position: f64) -> f64 {
    let hi = high_mask(log_rad, position);
    (1.0 - hi * hi).max(0.0).sqrt()
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

fn angle_mask(angle: f64, band: usize, n_orientations: usize) -> f64 {
    let order = n_orientations - 1;
    let constant = 2f64.powi(2 * order as i32) * factorial(order).powi(2)
        / (n_orientations as f64 * factorial(2 * order));
    let diff = angle - PI * band as f64 / n_orientations as f64;
    let wrapped = (diff + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped.abs() < PI / 2.0 {
        2.0 * constant.sqrt() * diff.cos().powi(order as i32)
    } else {
        0.0
    }
}

/// `(-i)^order`.
fn band_phase(order: usize) -> Complex64 {
    match order % 4 {
        0 => Complex64::new(1.0, 0.0),
        1 => Complex64::new(0.0, -1.0),
        2 => Complex64::new(-1.0, 0.0),
        _ => Complex64::new(0.0, 1.0),
    }
}

fn centre(dim: usize) -> usize {
    ((dim as f64 + 0.5) / 2.0).ceil() as usize
}

/// Masks used at one scale.
#[derive(Debug, Clone)]
struct PyramidLevel {
    dims: (usize, usize),
    fft: Fft2,
    /// `(-i)^order * angle_mask * high_mask`, one per orientation, centered.
    filters: Vec<Array2<Complex64>>,
    /// Crop into the next level: start offset and size.
    crop_start: (usize, usize),
    crop_dims: (usize, usize),
    /// Low-pass mask applied after cropping, at `crop_dims`.
    low: Array2<f64>,
}

/// Frequency-domain steerable pyramid with precomputed masks.
#[derive(Debug, Clone)]
pub struct SteerablePyramid {
    resolution: (usize, usize),
    order: usize,
    fft: Fft2,
    low0: Array2<f64>,
    levels: Vec<PyramidLevel>,
}

impl SteerablePyramid {
    pub fn new(resolution: (usize, usize), num_scales: usize, order: usize) -> MetamerResult<Self> {
        let max_height = max_pyramid_height(resolution);
        if num_scales == 0 || num_scales > max_height {
            return Err(MetamerError::config(
                "num_scales",
                num_scales,
                format!(
                    "must lie in 1..={max_height} for a {}x{} image",
                    resolution.0, resolution.1
                ),
            ));
        }
        if order > 15 {
            return Err(MetamerError::config("order", order, "must be at most 15"));
        }
        let n_orientations = order + 1;
        let (h, w) = resolution;

        // polar frequency grid, shared by every level through cropping
        let ramp = |n: usize, i: usize| (i as f64 - (n as f64) / 2.0) * 2.0 / n as f64;
        let mut log_rad = Array2::from_shape_fn((h, w), |(r, c)| ramp(w, c).hypot(ramp(h, r)));
        let angle = Array2::from_shape_fn((h, w), |(r, c)| ramp(h, r).atan2(ramp(w, c)));
        let (cr, cc) = (centre(h) - 1, centre(w) - 1);
        if cc > 0 {
            log_rad[[cr, cc]] = log_rad[[cr, cc - 1]];
        }
        log_rad.mapv_inplace(f64::log2);

        let mut position = -0.5;
        let low0 = log_rad.mapv(|r| low_mask(r, position));

        let mut levels = Vec::with_capacity(num_scales);
        let mut log_rad = log_rad;
        let mut angle = angle;
        for _ in 0..num_scales {
            position -= 1.0;
            let dims = log_rad.dim();
            let phase = band_phase(order);
            let filters = (0..n_orientations)
                .map(|b| {
                    ndarray::Zip::from(&log_rad)
                        .and(&angle)
                        .map_collect(|&r, &a| {
                            phase * (angle_mask(a, b, n_orientations) * high_mask(r, position))
                        })
                })
                .collect();

            let crop_dims = (
                ((dims.0 as f64 - 0.5) / 2.0).ceil() as usize,
                ((dims.1 as f64 - 0.5) / 2.0).ceil() as usize,
            );
            let crop_start = (
                centre(dims.0) - centre(crop_dims.0),
                centre(dims.1) - centre(crop_dims.1),
            );
            let window = s![
                crop_start.0..crop_start.0 + crop_dims.0,
                crop_start.1..crop_start.1 + crop_dims.1
            ];
            log_rad = log_rad.slice(window).to_owned();
            angle = angle.slice(window).to_owned();
            let low = log_rad.mapv(|r| low_mask(r, position));

            levels.push(PyramidLevel {
                dims,
                fft: Fft2::new(dims),
                filters,
                crop_start,
                crop_dims,
                low,
            });
        }

        Ok(Self {
            resolution,
            order,
            fft: Fft2::new(resolution),
            low0,
            levels,
        })
    }

    pub fn resolution(&self) -> (usize, usize) {
        self.resolution
    }

    pub fn num_scales(&self) -> usize {
        self.levels.len()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_orientations(&self) -> usize {
        self.order + 1
    }

    /// Band resolution at `scale`.
    pub fn scale_resolution(&self, scale: usize) -> Option<(usize, usize)> {
        self.levels.get(scale).map(|level| level.dims)
    }

    /// Complex oriented bands of a real image.
    pub fn decompose(&self, image: &Array2<f64>) -> MetamerResult<PyramidBands> {
        if image.dim() != self.resolution {
            return Err(MetamerError::shape_mismatch(
                self.resolution,
                image.dim(),
                "steerable pyramid",
            ));
        }
        let spectrum = fftshift(&self.fft.forward_real(image));
        let mut low = spectrum * &self.low0.mapv(|v| Complex64::new(v, 0.0));

        let mut bands = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            let scale_bands = level
                .filters
                .iter()
                .map(|filter| level.fft.inverse(&ifftshift(&(&low * filter))))
                .collect();
            bands.push(scale_bands);

            let (r0, c0) = level.crop_start;
            let (rh, cw) = level.crop_dims;
            low = low.slice(s![r0..r0 + rh, c0..c0 + cw]).to_owned()
                * &level.low.mapv(|v| Complex64::new(v, 0.0));
        }
        Ok(bands)
    }

    /// Adjoint of [`SteerablePyramid::decompose`] for a real input.
    ///
    /// `grads[s][b]` holds `dL/dRe + i dL/dIm` for each coefficient; the
    /// result is `dL/dx`.
    pub fn adjoint(&self, grads: &PyramidBands) -> MetamerResult<Array2<f64>> {
        if grads.len() != self.levels.len() {
            return Err(MetamerError::config(
                "grads",
                grads.len(),
                format!("expected {} scales", self.levels.len()),
            ));
        }

        let mut carry: Option<Array2<Complex64>> = None;
        for (level, scale_grads) in self.levels.iter().zip(grads).rev() {
            if scale_grads.len() != level.filters.len() {
                return Err(MetamerError::config(
                    "grads",
                    scale_grads.len(),
                    format!("expected {} orientations", level.filters.len()),
                ));
            }
            let n = (level.dims.0 * level.dims.1) as f64;
            let mut acc = Array2::<Complex64>::zeros(level.dims);
            for (filter, grad) in level.filters.iter().zip(scale_grads) {
                if grad.dim() != level.dims {
                    return Err(MetamerError::shape_mismatch(
                        level.dims,
                        grad.dim(),
                        "steerable pyramid adjoint",
                    ));
                }
                let spectrum = fftshift(&level.fft.forward(grad));
                ndarray::Zip::from(&mut acc)
                    .and(&spectrum)
                    .and(filter)
                    .for_each(|a, &g, &f| *a += f.conj() * g / n);
            }
            if let Some(next) = carry.take() {
                let (r0, c0) = level.crop_start;
                let (rh, cw) = level.crop_dims;
                let mut window = acc.slice_mut(s![r0..r0 + rh, c0..c0 + cw]);
                ndarray::Zip::from(&mut window)
                    .and(&next)
                    .and(&level.low)
                    .for_each(|a, &g, &m| *a += g * m);
            }
            carry = Some(acc);
        }

        let mut top = carry.unwrap_or_else(|| Array2::zeros(self.resolution));
        ndarray::Zip::from(&mut top)
            .and(&self.low0)
            .for_each(|a, &m| *a *= m);
        let spatial = self.fft.inverse_unnormalized(&ifftshift(&top));
        Ok(spatial.mapv(|v| v.re))
    }
}
