//! Initial candidate images.

use ndarray::{Array2, ArrayView2, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::spectral::Fft2;

/// Starting point of a synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitialImageType {
    /// Uniform noise in `[0, 1)`.
    #[default]
    White,
    /// Noise with a `1/f` amplitude spectrum.
    Pink,
    /// Noise with an `f` amplitude spectrum.
    Blue,
    /// Constant 0.5.
    Gray,
}

impl InitialImageType {
    pub fn name(&self) -> &'static str {
        match self {
            InitialImageType::White => "white",
            InitialImageType::Pink => "pink",
            InitialImageType::Blue => "blue",
            InitialImageType::Gray => "gray",
        }
    }

    /// Draws an image of `shape` with values in `[0, 1]`.
    pub fn generate(&self, shape: (usize, usize), rng: &mut StdRng) -> Array2<f32> {
        match self {
            InitialImageType::White => Array2::from_shape_simple_fn(shape, || rng.gen::<f32>()),
            InitialImageType::Gray => Array2::from_elem(shape, 0.5),
            InitialImageType::Pink => colored_noise(shape, -1.0, rng),
            InitialImageType::Blue => colored_noise(shape, 1.0, rng),
        }
    }
}

/// Gaussian noise whose amplitude spectrum is `f^exponent`, DC removed,
/// rescaled to `[0, 1]`.
fn colored_noise(shape: (usize, usize), exponent: f64, rng: &mut StdRng) -> Array2<f32> {
    let (h, w) = shape;
    let noise = Array2::from_shape_simple_fn(shape, || rng.sample::<f64, _>(StandardNormal));
    let fft = Fft2::new(shape);
    let mut spectrum = fft.forward_real(&noise);

    // unshifted frequency of index i along an axis of length n, in cycles/pixel
    let freq = |i: usize, n: usize| {
        let k = if i <= n / 2 { i as f64 } else { i as f64 - n as f64 };
        k / n as f64
    };
    for ((r, c), value) in spectrum.indexed_iter_mut() {
        let f = freq(r, h).hypot(freq(c, w));
        *value = if f == 0.0 {
            Complex64::new(0.0, 0.0)
        } else {
            *value * f.powf(exponent)
        };
    }

    let image = fft.inverse(&spectrum).mapv(|z| z.re);
    rescale_unit(&image)
}

fn rescale_unit(image: &Array2<f64>) -> Array2<f32> {
    let (lo, hi) = image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    if !range.is_finite() || range <= 0.0 {
        return Array2::from_elem(image.dim(), 0.5);
    }
    image.mapv(|v| ((v - lo) / range) as f32)
}

/// Blends `initial` with `reference` so that pixels outside every window
/// (the fovea and the far corners) start from the reference:
/// `coverage * initial + (1 - coverage) * reference`.
pub fn seed_uncovered(
    initial: &Array2<f32>,
    reference: ArrayView2<'_, f32>,
    coverage: ArrayView2<'_, f32>,
) -> Array2<f32> {
    Zip::from(initial)
        .and(reference)
        .and(coverage)
        .map_collect(|&init, &reference, &weight| {
            let weight = weight.clamp(0.0, 1.0);
            weight * init + (1.0 - weight) * reference
        })
}
