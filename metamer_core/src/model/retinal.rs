//! Luminance-only model: the representation is the pooled image.

use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};

use super::{
    check_grad, check_image, warn_if_windows_subpixel, ModelDetail, ModelOutput, ModelParams,
    RepresentationLayout, VisualModel,
};
use crate::error::{MetamerError, MetamerResult};
use crate::pooling::PoolingOperator;
use crate::windows::{WindowBank, WindowCache, WindowParams};

#[derive(Debug, Clone)]
pub struct RetinalModel {
    pooling: PoolingOperator,
    layout: RepresentationLayout,
}

impl RetinalModel {
    /// Builds the model. Only a single window scale is meaningful here, so
    /// `params.num_scales` must be 1.
    pub fn new(params: WindowParams, cache: &WindowCache) -> MetamerResult<Self> {
        if params.num_scales != 1 {
            return Err(MetamerError::config(
                "num_scales",
                params.num_scales,
                "the retinal model pools a single scale",
            ));
        }
        let bank = cache.load_or_build(&params)?;
        warn_if_windows_subpixel(&params);
        Ok(Self::from_bank(bank))
    }

    /// Wraps an already built bank, pooling its finest scale.
    pub fn from_bank(bank: Arc<WindowBank>) -> Self {
        let layout = RepresentationLayout::retinal(bank.n_polar_windows(), bank.n_eccentricity_bands());
        Self {
            pooling: PoolingOperator::new(bank),
            layout,
        }
    }

    pub fn pooling(&self) -> &PoolingOperator {
        &self.pooling
    }
}

impl VisualModel for RetinalModel {
    fn params(&self) -> ModelParams {
        ModelParams::Retinal {
            windows: self.pooling.bank().params().clone(),
        }
    }

    fn window_bank(&self) -> &Arc<WindowBank> {
        self.pooling.bank()
    }

    fn layout(&self) -> &RepresentationLayout {
        &self.layout
    }

    fn forward(&self, image: ArrayView2<'_, f32>) -> MetamerResult<ModelOutput> {
        check_image(self.image_resolution(), image, "retinal forward")?;
        let representation = self.pooling.pool_image(image)?;
        Ok(ModelOutput {
            image: image.to_owned(),
            representation,
            detail: ModelDetail::Retinal,
        })
    }

    fn backward(&self, _output: &ModelOutput, grad: ArrayView1<'_, f32>) -> MetamerResult<Array2<f32>> {
        check_grad(self.representation_len(), grad, "retinal backward")?;
        self.pooling.backward_scale(0, grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn model() -> RetinalModel {
        RetinalModel::new(WindowParams::new(0.5, (32, 32)), &WindowCache::default()).expect("model")
    }

    #[test]
    fn representation_has_one_value_per_window() {
        let model = model();
        let out = model
            .forward(Array2::from_elem((32, 32), 0.25).view())
            .expect("forward");
        assert_eq!(out.representation.len(), model.window_bank().num_windows());
        assert!(out.representation.iter().all(|&v| (v - 0.25).abs() < 1e-5));
    }

    #[test]
    fn rejects_multiple_scales_and_wrong_images() {
        let params = WindowParams::new(0.5, (32, 32)).with_num_scales(2);
        assert!(RetinalModel::new(params, &WindowCache::default())
            .unwrap_err()
            .is_configuration());
        let err = model().forward(Array2::<f32>::zeros((16, 32)).view()).unwrap_err();
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn nan_propagates_instead_of_failing() {
        let model = model();
        let mut image = Array2::from_elem((32, 32), 0.5f32);
        image.fill(f32::NAN);
        let out = model.forward(image.view()).expect("forward");
        assert!(out.representation.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn backward_of_constant_grad_spreads_mass() {
        let model = model();
        let out = model
            .forward(Array2::from_elem((32, 32), 0.5).view())
            .expect("forward");
        let grad = Array1::from_elem(model.representation_len(), 1.0f32);
        let image_grad = model.backward(&out, grad.view()).expect("backward");
        // each window distributes exactly unit mass
        assert!((image_grad.sum() - model.representation_len() as f32).abs() < 1e-2);
    }
}
