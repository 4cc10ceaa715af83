//! Log-polar pooling windows.
//!
//! A [`WindowBank`] holds, for every scale, one mask per angular window and
//! one mask per eccentricity band. The pooling windows proper are the
//! products `angular[a] * eccentricity[e]`; they are never materialized
//! densely. Window index `e * n_polar_windows + a` is used everywhere a flat
//! window order is needed.

pub mod cache;
pub mod geometry;

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};
pub use cache::{cache_key, CacheStats, WindowCache, DEFAULT_MEMORY_CAPACITY};
pub use geometry::{
    calc_angular_n_windows, calc_angular_window_spacing, calc_eccentricity_n_windows,
    calc_eccentricity_window_spacing, calc_min_eccentricity, calc_scaling,
    downsampled_resolution, EccentricityLayout, WindowType,
};

/// Everything needed to (re)build a window bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowParams {
    pub scaling: f64,
    /// `(height, width)` of the full-resolution image.
    pub image_resolution: (usize, usize),
    pub min_eccentricity: f64,
    pub max_eccentricity: f64,
    pub num_scales: usize,
    pub window_type: WindowType,
}

impl WindowParams {
    /// Parameters with the defaults used for the experiments: eccentricity
    /// from 0.5 to 15 degrees, one scale, cosine windows.
    pub fn new(scaling: f64, image_resolution: (usize, usize)) -> Self {
        Self {
            scaling,
            image_resolution,
            min_eccentricity: 0.5,
            max_eccentricity: 15.0,
            num_scales: 1,
            window_type: WindowType::default(),
        }
    }

    pub fn with_eccentricity_range(mut self, min_eccentricity: f64, max_eccentricity: f64) -> Self {
        self.min_eccentricity = min_eccentricity;
        self.max_eccentricity = max_eccentricity;
        self
    }

    pub fn with_num_scales(mut self, num_scales: usize) -> Self {
        self.num_scales = num_scales;
        self
    }

    pub fn with_window_type(mut self, window_type: WindowType) -> Self {
        self.window_type = window_type;
        self
    }

    pub fn scale_resolution(&self, scale: usize) -> (usize, usize) {
        downsampled_resolution(self.image_resolution, scale)
    }

    /// Validates the parameters and derives the window counts without
    /// allocating any mask.
    pub fn validate(&self) -> MetamerResult<WindowGeometry> {
        self.window_type.validate()?;

        if !self.scaling.is_finite() || self.scaling <= 0.0 {
            return Err(MetamerError::config("scaling", self.scaling, "must be positive"));
        }
        let (h, w) = self.image_resolution;
        if h == 0 || w == 0 {
            return Err(MetamerError::config(
                "image_resolution",
                format!("{h}x{w}"),
                "both dimensions must be non-zero",
            ));
        }
        if !self.min_eccentricity.is_finite() || self.min_eccentricity <= 0.0 {
            return Err(MetamerError::config(
                "min_eccentricity",
                self.min_eccentricity,
                "must be positive",
            ));
        }
        if !self.max_eccentricity.is_finite() || self.max_eccentricity <= self.min_eccentricity {
            return Err(MetamerError::config(
                "max_eccentricity",
                self.max_eccentricity,
                format!("must exceed min_eccentricity ({})", self.min_eccentricity),
            ));
        }
        if self.num_scales == 0 {
            return Err(MetamerError::config("num_scales", self.num_scales, "must be at least 1"));
        }

        let angular_spacing = calc_angular_window_spacing(self.scaling, &self.window_type);
        let n_polar_windows = geometry::ceil_count(calc_angular_n_windows(angular_spacing));
        if n_polar_windows < 2 {
            return Err(MetamerError::config(
                "scaling",
                self.scaling,
                format!("implies {n_polar_windows} angular window(s); at least 2 are required"),
            ));
        }

        let implied = geometry::eccentricity_spacing_from_scaling(self.scaling, &self.window_type);
        let n_eccentricity_bands = geometry::ceil_count(calc_eccentricity_n_windows(
            implied,
            self.min_eccentricity,
            self.max_eccentricity,
        ))
        .max(1);
        let spacing = calc_eccentricity_window_spacing(
            self.min_eccentricity,
            self.max_eccentricity,
            n_eccentricity_bands as f64,
        );

        Ok(WindowGeometry {
            n_polar_windows,
            angular_spacing: 2.0 * std::f64::consts::PI / n_polar_windows as f64,
            eccentricity: EccentricityLayout {
                min_eccentricity: self.min_eccentricity,
                max_eccentricity: self.max_eccentricity,
                spacing,
                n_bands: n_eccentricity_bands,
            },
        })
    }
}

/// Window counts and spacings derived from [`WindowParams`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub n_polar_windows: usize,
    /// Radians between neighbouring angular window centers.
    pub angular_spacing: f64,
    pub eccentricity: EccentricityLayout,
}

impl WindowGeometry {
    pub fn n_eccentricity_bands(&self) -> usize {
        self.eccentricity.n_bands
    }

    pub fn num_windows(&self) -> usize {
        self.n_polar_windows * self.eccentricity.n_bands
    }

    /// Center of flat window `index` as (eccentricity in degrees, angle in
    /// radians).
    pub fn window_center(&self, index: usize) -> (f64, f64) {
        let band = index / self.n_polar_windows;
        let angle = (index % self.n_polar_windows) as f64 * self.angular_spacing;
        (self.eccentricity.band_center(band), angle)
    }
}

/// Masks for one scale. Axis 0 of each array indexes the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleWindows {
    pub resolution: (usize, usize),
    pub angular: Array3<f32>,
    pub eccentricity: Array3<f32>,
}

impl ScaleWindows {
    /// Sum of all product windows at every pixel: 1 inside the modeled
    /// annulus, 0 in the fovea and beyond `max_eccentricity`.
    pub fn coverage(&self) -> Array2<f32> {
        let angular = self.angular.sum_axis(Axis(0));
        let eccentricity = self.eccentricity.sum_axis(Axis(0));
        angular * eccentricity
    }
}

/// Radial and angular extents of the windows in one eccentricity band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowWidths {
    pub central_eccentricity: f64,
    pub radial_full: f64,
    pub radial_top: f64,
    pub angular_full: f64,
    pub angular_top: f64,
}

impl WindowWidths {
    fn scaled(&self, factor: f64) -> Self {
        Self {
            central_eccentricity: self.central_eccentricity * factor,
            radial_full: self.radial_full * factor,
            radial_top: self.radial_top * factor,
            angular_full: self.angular_full * factor,
            angular_top: self.angular_top * factor,
        }
    }
}

/// Immutable multi-scale bank of angular and eccentricity masks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowBank {
    params: WindowParams,
    geometry: WindowGeometry,
    scales: Vec<ScaleWindows>,
}

impl WindowBank {
    /// Builds every scale's masks directly at that scale's resolution.
    pub fn build(params: &WindowParams) -> MetamerResult<Self> {
        let geometry = params.validate()?;
        tracing::debug!(
            scaling = params.scaling,
            n_polar = geometry.n_polar_windows,
            n_ecc = geometry.n_eccentricity_bands(),
            num_scales = params.num_scales,
            window_type = params.window_type.name(),
            "building pooling windows"
        );
        let scales = (0..params.num_scales)
            .map(|scale| build_scale(params, &geometry, params.scale_resolution(scale)))
            .collect::<MetamerResult<Vec<_>>>()?;
        Ok(Self {
            params: params.clone(),
            geometry,
            scales,
        })
    }

    pub fn params(&self) -> &WindowParams {
        &self.params
    }

    pub fn geometry(&self) -> &WindowGeometry {
        &self.geometry
    }

    pub fn n_polar_windows(&self) -> usize {
        self.geometry.n_polar_windows
    }

    pub fn n_eccentricity_bands(&self) -> usize {
        self.geometry.n_eccentricity_bands()
    }

    pub fn num_windows(&self) -> usize {
        self.geometry.num_windows()
    }

    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    pub fn scales(&self) -> &[ScaleWindows] {
        &self.scales
    }

    pub fn scale(&self, scale: usize) -> Option<&ScaleWindows> {
        self.scales.get(scale)
    }

    /// Window extents in degrees, one entry per eccentricity band.
    pub fn window_widths_degrees(&self) -> Vec<WindowWidths> {
        let layout = &self.geometry.eccentricity;
        let wt = &self.params.window_type;
        (0..layout.n_bands)
            .map(|band| {
                let center = layout.band_center(band);
                let radial = |width: f64| {
                    let half = width * layout.spacing / 2.0;
                    center * (half.exp() - (-half).exp())
                };
                WindowWidths {
                    central_eccentricity: center,
                    radial_full: radial(wt.full_width()),
                    radial_top: radial(wt.flat_top_width()),
                    angular_full: center * wt.full_width() * self.geometry.angular_spacing,
                    angular_top: center * wt.flat_top_width() * self.geometry.angular_spacing,
                }
            })
            .collect()
    }

    /// Window extents in pixels of scale `scale`.
    pub fn window_widths_pixels(&self, scale: usize) -> Vec<WindowWidths> {
        let dpp = geometry::degrees_per_pixel(
            self.params.scale_resolution(scale),
            self.params.max_eccentricity,
        );
        self.window_widths_degrees()
            .iter()
            .map(|w| w.scaled(1.0 / dpp))
            .collect()
    }
}

fn build_scale(
    params: &WindowParams,
    geometry: &WindowGeometry,
    resolution: (usize, usize),
) -> MetamerResult<ScaleWindows> {
    let (h, w) = resolution;
    let n_polar = geometry.n_polar_windows;
    let n_ecc = geometry.n_eccentricity_bands();
    let (ecc, angle) = geometry::pixel_polar_grid(resolution, params.max_eccentricity);
    let wt = params.window_type;

    // one row of weights per pixel, evaluated independently
    let angular_rows: Vec<Vec<f32>> = angle
        .par_iter()
        .map(|&theta| {
            let mut out = vec![0.0f64; n_polar];
            geometry::angular_weights(theta, &wt, &mut out);
            out.into_iter().map(|v| v as f32).collect()
        })
        .collect();
    let ecc_rows: Vec<Vec<f32>> = ecc
        .par_iter()
        .map(|&e| {
            let mut out = vec![0.0f64; n_ecc];
            geometry.eccentricity.weights(e, &wt, &mut out);
            out.into_iter().map(|v| v as f32).collect()
        })
        .collect();

    Ok(ScaleWindows {
        resolution,
        angular: transpose_rows(&angular_rows, n_polar, h, w)?,
        eccentricity: transpose_rows(&ecc_rows, n_ecc, h, w)?,
    })
}

fn transpose_rows(rows: &[Vec<f32>], n: usize, h: usize, w: usize) -> MetamerResult<Array3<f32>> {
    let mut data = vec![0.0f32; n * h * w];
    for (pixel, row) in rows.iter().enumerate() {
        for (window, &value) in row.iter().enumerate() {
            data[window * h * w + pixel] = value;
        }
    }
    Array3::from_shape_vec((n, h, w), data).map_err(|err| {
        MetamerError::config("image_resolution", format!("{h}x{w}"), err.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> WindowParams {
        WindowParams::new(0.5, (64, 64)).with_eccentricity_range(0.5, 15.0)
    }

    #[test]
    fn eccentricity_masks_partition_unity_inside_range() {
        for wt in [WindowType::cosine(0.5), WindowType::gaussian(1.0)] {
            let params = small_params().with_window_type(wt).with_num_scales(2);
            let bank = WindowBank::build(&params).expect("valid params");
            for (scale, windows) in bank.scales().iter().enumerate() {
                let (ecc, _) = geometry::pixel_polar_grid(windows.resolution, 15.0);
                let sums = windows.eccentricity.sum_axis(Axis(0));
                for (pixel, &e) in ecc.iter().enumerate() {
                    let total = sums.as_slice().expect("contiguous")[pixel];
                    if (0.5..=15.0).contains(&e) {
                        assert!((total - 1.0).abs() < 1e-5, "scale {scale} ecc {e}: {total}");
                    } else {
                        assert_eq!(total, 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn angular_masks_partition_unity_everywhere() {
        let bank = WindowBank::build(&small_params()).expect("valid params");
        let sums = bank.scales()[0].angular.sum_axis(Axis(0));
        assert!(sums.iter().all(|&s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn scales_are_regenerated_at_lower_resolution() {
        let params = WindowParams::new(0.5, (64, 48)).with_num_scales(3);
        let bank = WindowBank::build(&params).expect("valid params");
        assert_eq!(bank.scales()[0].resolution, (64, 48));
        assert_eq!(bank.scales()[1].resolution, (32, 24));
        assert_eq!(bank.scales()[2].resolution, (16, 12));
        assert_eq!(bank.scales()[2].angular.dim(), (bank.n_polar_windows(), 16, 12));
        assert_eq!(
            bank.scales()[2].eccentricity.dim(),
            (bank.n_eccentricity_bands(), 16, 12)
        );
    }

    #[test]
    fn foveal_hole_has_no_coverage() {
        let params = small_params().with_eccentricity_range(2.0, 15.0);
        let bank = WindowBank::build(&params).expect("valid params");
        let coverage = bank.scales()[0].coverage();
        // the 4 central pixels sit well inside 2 degrees
        assert_eq!(coverage[[31, 31]], 0.0);
        assert_eq!(coverage[[32, 32]], 0.0);
        // a pixel 10 degrees to the right is fully covered
        let col = 32 + (10.0 / geometry::degrees_per_pixel((64, 64), 15.0)) as usize;
        assert!((coverage[[32, col]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn degenerate_parameters_fail_fast() {
        let cases = [
            small_params().with_eccentricity_range(5.0, 5.0),
            small_params().with_eccentricity_range(0.0, 5.0),
            small_params().with_num_scales(0),
            WindowParams::new(-1.0, (64, 64)),
            WindowParams::new(0.5, (0, 64)),
            small_params().with_window_type(WindowType::gaussian(2.0)),
        ];
        for params in cases {
            let err = WindowBank::build(&params).unwrap_err();
            assert!(err.is_configuration(), "{params:?} gave {err}");
        }
    }

    #[test]
    fn huge_scaling_needs_two_angular_windows() {
        // angular spacing of 2π leaves a single window
        let params = WindowParams::new(4.0 * std::f64::consts::PI, (32, 32));
        let err = params.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn smaller_scaling_gives_more_windows() {
        let coarse = small_params().validate().expect("valid");
        let fine = WindowParams::new(0.25, (64, 64)).validate().expect("valid");
        assert!(fine.n_polar_windows > coarse.n_polar_windows);
        assert!(fine.n_eccentricity_bands() > coarse.n_eccentricity_bands());
    }

    #[test]
    fn widths_grow_with_eccentricity() {
        let bank = WindowBank::build(&small_params()).expect("valid params");
        let widths = bank.window_widths_degrees();
        assert_eq!(widths.len(), bank.n_eccentricity_bands());
        for pair in widths.windows(2) {
            assert!(pair[1].radial_full > pair[0].radial_full);
            assert!(pair[1].angular_full > pair[0].angular_full);
            assert!(pair[0].radial_top < pair[0].radial_full);
        }
        let pixels = bank.window_widths_pixels(0);
        let dpp = geometry::degrees_per_pixel((64, 64), 15.0);
        assert!((pixels[0].radial_full * dpp - widths[0].radial_full).abs() < 1e-9);
    }

    #[test]
    fn window_center_follows_flat_index() {
        let geometry = small_params().validate().expect("valid");
        let (ecc0, angle0) = geometry.window_center(0);
        assert!((ecc0 - geometry.eccentricity.band_center(0)).abs() < 1e-12);
        assert_eq!(angle0, 0.0);
        let (ecc1, angle1) = geometry.window_center(geometry.n_polar_windows + 1);
        assert!((ecc1 - geometry.eccentricity.band_center(1)).abs() < 1e-12);
        assert!((angle1 - geometry.angular_spacing).abs() < 1e-12);
    }
}
