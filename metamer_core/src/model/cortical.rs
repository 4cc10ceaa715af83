//! Oriented-energy model.
//!
//! The image is decomposed by a complex steerable pyramid with `order + 1`
//! orientations per scale. Each band's magnitude (phase-invariant energy) is
//! pooled with the windows of its scale, and the raw image is pooled with the
//! full-resolution windows as a luminance channel. Energies come first,
//! scale-major, followed by luminance.

use std::sync::Arc;

use ndarray::{s, Array2, ArrayView1, ArrayView2, Zip};
use rustfft::num_complex::Complex64;

use super::{
    check_grad, check_image, warn_if_windows_subpixel, ModelDetail, ModelOutput, ModelParams,
    RepresentationLayout, VisualModel,
};
use crate::error::{MetamerError, MetamerResult};
use crate::pooling::PoolingOperator;
use crate::spectral::{max_pyramid_height, PyramidBands, SteerablePyramid};
use crate::windows::{WindowBank, WindowCache, WindowParams};

/// Coefficients smaller than this have no well-defined phase; their energy
/// gradient is taken to be zero.
const ENERGY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct CorticalModel {
    pooling: PoolingOperator,
    pyramid: SteerablePyramid,
    layout: RepresentationLayout,
}

impl CorticalModel {
    /// Builds the model with `params.num_scales` pyramid scales of
    /// `order + 1` orientations.
    pub fn new(params: WindowParams, order: usize, cache: &WindowCache) -> MetamerResult<Self> {
        params.validate()?;
        let max_height = max_pyramid_height(params.image_resolution);
        if params.num_scales > max_height {
            return Err(MetamerError::config(
                "num_scales",
                params.num_scales,
                format!(
                    "a {}x{} image supports at most {max_height} pyramid scale(s)",
                    params.image_resolution.0, params.image_resolution.1
                ),
            ));
        }
        let pyramid = SteerablePyramid::new(params.image_resolution, params.num_scales, order)?;
        let bank = cache.load_or_build(&params)?;
        warn_if_windows_subpixel(&params);
        Ok(Self::from_parts(bank, pyramid))
    }

    fn from_parts(bank: Arc<WindowBank>, pyramid: SteerablePyramid) -> Self {
        let layout = RepresentationLayout::cortical(
            bank.n_polar_windows(),
            bank.n_eccentricity_bands(),
            pyramid.num_scales(),
            pyramid.num_orientations(),
        );
        Self {
            pooling: PoolingOperator::new(bank),
            pyramid,
            layout,
        }
    }

    pub fn order(&self) -> usize {
        self.pyramid.order()
    }

    pub fn num_orientations(&self) -> usize {
        self.pyramid.num_orientations()
    }

    pub fn pyramid(&self) -> &SteerablePyramid {
        &self.pyramid
    }

    pub fn pooling(&self) -> &PoolingOperator {
        &self.pooling
    }

    fn energy_len(&self) -> usize {
        self.pyramid.num_scales() * self.num_orientations() * self.pooling.num_windows()
    }
}

impl VisualModel for CorticalModel {
    fn params(&self) -> ModelParams {
        ModelParams::Cortical {
            windows: self.pooling.bank().params().clone(),
            order: self.order(),
        }
    }

    fn window_bank(&self) -> &Arc<WindowBank> {
        self.pooling.bank()
    }

    fn layout(&self) -> &RepresentationLayout {
        &self.layout
    }

    fn forward(&self, image: ArrayView2<'_, f32>) -> MetamerResult<ModelOutput> {
        check_image(self.image_resolution(), image, "cortical forward")?;
        let coefficients = self.pyramid.decompose(&image.mapv(f64::from))?;
        let energies: Vec<Vec<Array2<f32>>> = coefficients
            .iter()
            .map(|scale| scale.iter().map(|band| band.mapv(|z| z.norm() as f32)).collect())
            .collect();

        let pooled_energy = self.pooling.pool_bands(&energies)?;
        let luminance = self.pooling.pool_image(image)?;
        let mut representation = Vec::with_capacity(self.layout.len());
        representation.extend(pooled_energy.iter().copied());
        representation.extend(luminance.iter().copied());

        Ok(ModelOutput {
            image: image.to_owned(),
            representation: representation.into(),
            detail: ModelDetail::Cortical {
                coefficients,
                energies,
            },
        })
    }

    fn backward(&self, output: &ModelOutput, grad: ArrayView1<'_, f32>) -> MetamerResult<Array2<f32>> {
        check_grad(self.representation_len(), grad, "cortical backward")?;
        let coefficients = match &output.detail {
            ModelDetail::Cortical { coefficients, .. } => coefficients,
            ModelDetail::Retinal => {
                return Err(MetamerError::config(
                    "output",
                    "retinal",
                    "cortical backward needs the output of a cortical forward pass",
                ))
            }
        };

        let split = self.energy_len();
        let energy_grads = self
            .pooling
            .backward_bands(grad.slice(s![..split]), self.num_orientations())?;

        // d|z|/dz spreads the energy gradient along the coefficient's phase
        let complex_grads: PyramidBands = coefficients
            .iter()
            .zip(&energy_grads)
            .map(|(scale_coeffs, scale_grads)| {
                scale_coeffs
                    .iter()
                    .zip(scale_grads)
                    .map(|(z, g)| {
                        Zip::from(z).and(g).map_collect(|&z, &g| {
                            let magnitude = z.norm();
                            if magnitude < ENERGY_EPSILON {
                                Complex64::new(0.0, 0.0)
                            } else {
                                z * (g as f64 / magnitude)
                            }
                        })
                    })
                    .collect()
            })
            .collect();

        let mut image_grad = self.pyramid.adjoint(&complex_grads)?.mapv(|v| v as f32);
        image_grad += &self.pooling.backward_scale(0, grad.slice(s![split..]))?;
        Ok(image_grad)
    }
}
