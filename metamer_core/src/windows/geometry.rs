//! One-dimensional window profiles and the spacing relations between
//! scaling, window count and window width.
//!
//! Eccentricity windows live on a log-eccentricity axis measured in units of
//! the window spacing; angular windows live on the circle, also measured in
//! spacings. A window's full width at half maximum (FWHM) is what the
//! scaling parameter controls: at central eccentricity `e`, a window's radial
//! FWHM in degrees is `scaling * e`.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};

/// Default width of the raised-cosine transition region, as a fraction of
/// the window spacing.
pub const DEFAULT_TRANSITION_REGION_WIDTH: f64 = 0.5;

/// The only standard deviation (in window spacings) supported for Gaussian
/// windows.
pub const SUPPORTED_GAUSSIAN_STD_DEV: f64 = 1.0;

/// Gaussian windows are cut off beyond this many standard deviations.
pub const GAUSSIAN_TRUNCATION: f64 = 3.0;

/// Ratio of radial to circumferential window width.
pub const RADIAL_TO_CIRCUMFERENTIAL_RATIO: f64 = 2.0;

const FWHM_PER_STD_DEV: f64 = 2.354_820_045_030_949_4;

/// Shape of a single window profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// Flat-topped window with cos² transitions; neighbours sum to 1.
    Cosine { transition_region_width: f64 },
    /// Truncated Gaussian, renormalized so overlapping windows sum to 1.
    Gaussian { std_dev: f64 },
}

impl Default for WindowType {
    fn default() -> Self {
        WindowType::Cosine {
            transition_region_width: DEFAULT_TRANSITION_REGION_WIDTH,
        }
    }
}

impl WindowType {
    /// Raised-cosine windows. `transition_region_width` (in `(0, 1]`) sets
    /// the width of the ramps; the FWHM is always one window spacing.
    ///
    /// # Examples
    ///
    /// ```
    /// use foveated_metamer_core::WindowType;
    ///
    /// assert_eq!(WindowType::cosine(0.5).name(), "cosine");
    /// ```
    pub fn cosine(transition_region_width: f64) -> Self {
        WindowType::Cosine {
            transition_region_width,
        }
    }

    /// Gaussian windows with standard deviation `std_dev`, in units of
    /// window spacing.
    pub fn gaussian(std_dev: f64) -> Self {
        WindowType::Gaussian { std_dev }
    }

    /// Lowercase name used in configs and cache keys.
    pub fn name(&self) -> &'static str {
        match self {
            WindowType::Cosine { .. } => "cosine",
            WindowType::Gaussian { .. } => "gaussian",
        }
    }

    /// Checks the variant's own parameter.
    pub fn validate(&self) -> MetamerResult<()> {
        match *self {
            WindowType::Cosine {
                transition_region_width,
            } => {
                if !transition_region_width.is_finite()
                    || transition_region_width <= 0.0
                    || transition_region_width > 1.0
                {
                    return Err(MetamerError::config(
                        "transition_region_width",
                        transition_region_width,
                        "must lie in (0, 1]",
                    ));
                }
            }
            WindowType::Gaussian { std_dev } => {
                if (std_dev - SUPPORTED_GAUSSIAN_STD_DEV).abs() > 1e-12 {
                    return Err(MetamerError::config(
                        "std_dev",
                        std_dev,
                        format!("gaussian windows only support std_dev = {SUPPORTED_GAUSSIAN_STD_DEV}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Full width at half maximum, in window spacings.
    pub fn fwhm(&self) -> f64 {
        match *self {
            WindowType::Cosine { .. } => 1.0,
            WindowType::Gaussian { std_dev } => FWHM_PER_STD_DEV * std_dev,
        }
    }

    /// Width of the region where the profile equals 1, in spacings.
    pub fn flat_top_width(&self) -> f64 {
        match *self {
            WindowType::Cosine {
                transition_region_width,
            } => 1.0 - transition_region_width,
            WindowType::Gaussian { .. } => 0.0,
        }
    }

    /// Width of the full (nonzero) support, in spacings. Gaussian windows
    /// report their FWHM.
    pub fn full_width(&self) -> f64 {
        match *self {
            WindowType::Cosine {
                transition_region_width,
            } => 1.0 + transition_region_width,
            WindowType::Gaussian { .. } => self.fwhm(),
        }
    }

    /// Profile value at `x` spacings from the window center, before any
    /// renormalization.
    pub fn profile(&self, x: f64) -> f64 {
        match *self {
            WindowType::Cosine {
                transition_region_width,
            } => raised_cosine(x, transition_region_width),
            WindowType::Gaussian { std_dev } => {
                if x.abs() > GAUSSIAN_TRUNCATION * std_dev {
                    0.0
                } else {
                    (-x * x / (2.0 * std_dev * std_dev)).exp()
                }
            }
        }
    }

    fn renormalizes(&self) -> bool {
        matches!(self, WindowType::Gaussian { .. })
    }
}

/// Flat-topped raised-cosine profile. Copies spaced one unit apart sum to 1.
pub fn raised_cosine(x: f64, transition_region_width: f64) -> f64 {
    let t = transition_region_width;
    let ax = x.abs();
    let top = (1.0 - t) / 2.0;
    if ax <= top {
        1.0
    } else if ax >= (1.0 + t) / 2.0 {
        0.0
    } else {
        let phase = (PI / 2.0) * (ax - top) / t;
        phase.cos().powi(2)
    }
}

/// Log-eccentricity spacing that splits `[min_ecc, max_ecc]` into
/// `n_windows` bands.
pub fn calc_eccentricity_window_spacing(min_ecc: f64, max_ecc: f64, n_windows: f64) -> f64 {
    (max_ecc.ln() - min_ecc.ln()) / n_windows
}

/// Inverse of [`calc_eccentricity_window_spacing`].
pub fn calc_eccentricity_n_windows(window_spacing: f64, min_ecc: f64, max_ecc: f64) -> f64 {
    (max_ecc.ln() - min_ecc.ln()) / window_spacing
}

/// Log-eccentricity spacing implied by `scaling`, before the band count is
/// rounded to an integer.
pub fn eccentricity_spacing_from_scaling(scaling: f64, window_type: &WindowType) -> f64 {
    2.0 * (scaling / 2.0).asinh() / window_type.fwhm()
}

/// Scaling value for which `n_windows` bands exactly tile the range.
pub fn calc_scaling(n_windows: f64, min_ecc: f64, max_ecc: f64, window_type: &WindowType) -> f64 {
    let spacing = calc_eccentricity_window_spacing(min_ecc, max_ecc, n_windows);
    2.0 * (spacing * window_type.fwhm() / 2.0).sinh()
}

/// Angular spacing (radians) implied by `scaling`.
pub fn calc_angular_window_spacing(scaling: f64, window_type: &WindowType) -> f64 {
    scaling / (RADIAL_TO_CIRCUMFERENTIAL_RATIO * window_type.fwhm())
}

/// Number of polar windows around the circle for an angular spacing in
/// radians. Not rounded; callers take the ceiling.
pub fn calc_angular_n_windows(window_spacing: f64) -> f64 {
    2.0 * PI / window_spacing
}

/// Ceiling that ignores floating-point noise just above an integer.
pub(crate) fn ceil_count(value: f64) -> usize {
    (value - 1e-9).ceil().max(0.0) as usize
}

/// Resolution of scale `scale`: each step halves, rounding up.
pub fn downsampled_resolution(resolution: (usize, usize), scale: usize) -> (usize, usize) {
    let (mut h, mut w) = resolution;
    for _ in 0..scale {
        h = h.div_ceil(2);
        w = w.div_ceil(2);
    }
    (h, w)
}

/// Degrees of visual angle covered by one pixel at `resolution`, with
/// `max_ecc` at half the larger image dimension.
pub fn degrees_per_pixel(resolution: (usize, usize), max_ecc: f64) -> f64 {
    2.0 * max_ecc / resolution.0.max(resolution.1) as f64
}

/// Eccentricity at which a window covers `pixel_area_threshold` pixels at
/// full resolution. Windows closer to the fovea are smaller than that.
pub fn calc_min_eccentricity(
    scaling: f64,
    resolution: (usize, usize),
    max_ecc: f64,
    window_type: &WindowType,
    pixel_area_threshold: f64,
) -> f64 {
    let spacing = eccentricity_spacing_from_scaling(scaling, window_type);
    let angular = calc_angular_window_spacing(scaling, window_type);
    let full = window_type.full_width();
    let radial_per_degree = 2.0 * (full * spacing / 2.0).sinh();
    let angular_per_degree = full * angular;
    let dpp = degrees_per_pixel(resolution, max_ecc);
    dpp * (pixel_area_threshold / (radial_per_degree * angular_per_degree)).sqrt()
}

/// Placement of the eccentricity bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EccentricityLayout {
    pub min_eccentricity: f64,
    pub max_eccentricity: f64,
    /// Spacing in natural-log eccentricity.
    pub spacing: f64,
    pub n_bands: usize,
}

impl EccentricityLayout {
    /// Central eccentricity (degrees) of band `band`.
    pub fn band_center(&self, band: usize) -> f64 {
        (self.min_eccentricity.ln() + (band as f64 + 0.5) * self.spacing).exp()
    }

    /// Band weights at eccentricity `ecc`, written into `out` (length
    /// `n_bands`). Outside `[min, max]` every weight is zero. The innermost
    /// and outermost bands hold their peak value out to the range limits so
    /// the bands sum to 1 across the whole range.
    pub fn weights(&self, ecc: f64, window_type: &WindowType, out: &mut [f64]) {
        out.iter_mut().for_each(|w| *w = 0.0);
        if !ecc.is_finite() || ecc < self.min_eccentricity || ecc > self.max_eccentricity {
            return;
        }
        let u = (ecc / self.min_eccentricity).ln() / self.spacing;
        let last = self.n_bands - 1;
        for (band, weight) in out.iter_mut().enumerate() {
            let offset = u - (band as f64 + 0.5);
            *weight = if (band == 0 && offset <= 0.0) || (band == last && offset >= 0.0) {
                1.0
            } else {
                window_type.profile(offset)
            };
        }
        if window_type.renormalizes() {
            normalize_in_place(out);
        }
    }
}

/// Angular window weights at polar angle `theta` (radians), written into
/// `out` (length `n_polar`).
pub fn angular_weights(theta: f64, window_type: &WindowType, out: &mut [f64]) {
    let n = out.len();
    let spacing = 2.0 * PI / n as f64;
    for (k, weight) in out.iter_mut().enumerate() {
        let diff = wrap_angle(theta - k as f64 * spacing);
        *weight = window_type.profile(diff / spacing);
    }
    if window_type.renormalizes() {
        normalize_in_place(out);
    }
}

/// Wraps an angle into `[-π, π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

fn normalize_in_place(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

/// Eccentricity (degrees) and polar angle (radians) of every pixel center,
/// row-major. Angle is measured counter-clockwise from the rightward axis.
pub fn pixel_polar_grid(resolution: (usize, usize), max_ecc: f64) -> (Vec<f64>, Vec<f64>) {
    let (h, w) = resolution;
    let dpp = degrees_per_pixel(resolution, max_ecc);
    let center_row = (h as f64 - 1.0) / 2.0;
    let center_col = (w as f64 - 1.0) / 2.0;
    let mut ecc = Vec::with_capacity(h * w);
    let mut angle = Vec::with_capacity(h * w);
    for row in 0..h {
        let dy = (center_row - row as f64) * dpp;
        for col in 0..w {
            let dx = (col as f64 - center_col) * dpp;
            ecc.push(dx.hypot(dy));
            angle.push(dy.atan2(dx));
        }
    }
    (ecc, angle)
}

/// Pixel closest to a point given in eccentricity/angle, clamped to the grid.
pub fn nearest_pixel(
    resolution: (usize, usize),
    max_ecc: f64,
    eccentricity: f64,
    angle: f64,
) -> (usize, usize) {
    let (h, w) = resolution;
    let dpp = degrees_per_pixel(resolution, max_ecc);
    let center_row = (h as f64 - 1.0) / 2.0;
    let center_col = (w as f64 - 1.0) / 2.0;
    let col = center_col + eccentricity * angle.cos() / dpp;
    let row = center_row - eccentricity * angle.sin() / dpp;
    let clamp = |v: f64, len: usize| v.round().clamp(0.0, (len - 1) as f64) as usize;
    (clamp(row, h), clamp(col, w))
}
