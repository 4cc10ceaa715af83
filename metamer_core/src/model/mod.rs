//! Foveated representation models.
//!
//! A model maps a grayscale image to a fixed-length representation vector by
//! pooling one or more feature maps under a shared [`WindowBank`]. The set of
//! models is closed ([`RepresentationModel`]); the synthesis engine is
//! generic over the [`VisualModel`] trait so tests can substitute their own.
//!
//! Models carry no per-call state. Everything computed during
//! [`VisualModel::forward`] is returned in a [`ModelOutput`], which
//! [`VisualModel::backward`] consumes.

pub mod cortical;
pub mod layout;
pub mod retinal;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};
use crate::spectral::PyramidBands;
use crate::windows::{calc_min_eccentricity, WindowBank, WindowCache, WindowParams};

pub use cortical::CorticalModel;
pub use layout::{ChannelKind, RepresentationChannel, RepresentationLayout};
pub use retinal::RetinalModel;

/// Default pyramid order for the cortical model (four orientations).
pub const DEFAULT_ORDER: usize = 3;

/// Windows covering less than this many pixels trigger a construction warning.
pub const MIN_WINDOW_PIXEL_AREA: f64 = 1.0;

/// Constructive parameters of a model, tagged with the model kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelParams {
    Retinal {
        #[serde(flatten)]
        windows: WindowParams,
    },
    Cortical {
        #[serde(flatten)]
        windows: WindowParams,
        order: usize,
    },
}

impl ModelParams {
    pub fn name(&self) -> &'static str {
        match self {
            ModelParams::Retinal { .. } => "retinal",
            ModelParams::Cortical { .. } => "cortical",
        }
    }

    pub fn windows(&self) -> &WindowParams {
        match self {
            ModelParams::Retinal { windows } | ModelParams::Cortical { windows, .. } => windows,
        }
    }

    pub fn to_json(&self) -> MetamerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> MetamerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the parameter record as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MetamerResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> MetamerResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// Per-call intermediate values kept for the backward pass.
#[derive(Debug, Clone)]
pub enum ModelDetail {
    Retinal,
    Cortical {
        /// Complex pyramid coefficients, `[scale][orientation]`.
        coefficients: PyramidBands,
        /// `|coefficient|` maps, same layout.
        energies: Vec<Vec<Array2<f32>>>,
    },
}

/// Result of one forward pass.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub image: Array2<f32>,
    pub representation: Array1<f32>,
    pub detail: ModelDetail,
}

/// Differentiable image → representation map.
pub trait VisualModel: Send + Sync {
    fn params(&self) -> ModelParams;

    fn window_bank(&self) -> &Arc<WindowBank>;

    fn layout(&self) -> &RepresentationLayout;

    fn image_resolution(&self) -> (usize, usize) {
        self.window_bank().params().image_resolution
    }

    fn representation_len(&self) -> usize {
        self.layout().len()
    }

    /// Computes the representation of `image`. Non-finite pixels propagate
    /// into the representation instead of being rejected.
    fn forward(&self, image: ArrayView2<'_, f32>) -> MetamerResult<ModelOutput>;

    /// Gradient with respect to the image of a loss whose gradient with
    /// respect to `output.representation` is `grad`.
    fn backward(&self, output: &ModelOutput, grad: ArrayView1<'_, f32>) -> MetamerResult<Array2<f32>>;
}

/// The closed set of models.
#[derive(Debug, Clone)]
pub enum RepresentationModel {
    Retinal(RetinalModel),
    Cortical(CorticalModel),
}

impl RepresentationModel {
    /// Builds the model described by `params`, fetching windows through
    /// `cache`.
    pub fn from_params(params: &ModelParams, cache: &WindowCache) -> MetamerResult<Self> {
        match params {
            ModelParams::Retinal { windows } => {
                Ok(RepresentationModel::Retinal(RetinalModel::new(windows.clone(), cache)?))
            }
            ModelParams::Cortical { windows, order } => Ok(RepresentationModel::Cortical(
                CorticalModel::new(windows.clone(), *order, cache)?,
            )),
        }
    }

    /// Restores a model from a JSON parameter record.
    pub fn load<P: AsRef<Path>>(path: P, cache: &WindowCache) -> MetamerResult<Self> {
        Self::from_params(&ModelParams::load(path)?, cache)
    }

    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> MetamerResult<()> {
        self.params().save(path)
    }

    fn inner(&self) -> &dyn VisualModel {
        match self {
            RepresentationModel::Retinal(model) => model,
            RepresentationModel::Cortical(model) => model,
        }
    }
}

impl VisualModel for RepresentationModel {
    fn params(&self) -> ModelParams {
        self.inner().params()
    }

    fn window_bank(&self) -> &Arc<WindowBank> {
        self.inner().window_bank()
    }

    fn layout(&self) -> &RepresentationLayout {
        self.inner().layout()
    }

    fn forward(&self, image: ArrayView2<'_, f32>) -> MetamerResult<ModelOutput> {
        self.inner().forward(image)
    }

    fn backward(&self, output: &ModelOutput, grad: ArrayView1<'_, f32>) -> MetamerResult<Array2<f32>> {
        self.inner().backward(output, grad)
    }
}

/// Logs a warning when the innermost windows are smaller than a pixel.
pub(crate) fn warn_if_windows_subpixel(params: &WindowParams) {
    let threshold = calc_min_eccentricity(
        params.scaling,
        params.image_resolution,
        params.max_eccentricity,
        &params.window_type,
        MIN_WINDOW_PIXEL_AREA,
    );
    if params.min_eccentricity < threshold {
        tracing::warn!(
            min_eccentricity = params.min_eccentricity,
            recommended = threshold,
            "innermost pooling windows cover less than one pixel"
        );
    }
}

pub(crate) fn check_image(
    expected: (usize, usize),
    image: ArrayView2<'_, f32>,
    context: &str,
) -> MetamerResult<()> {
    if image.dim() != expected {
        return Err(MetamerError::shape_mismatch(expected, image.dim(), context));
    }
    Ok(())
}

pub(crate) fn check_grad(expected: usize, grad: ArrayView1<'_, f32>, context: &str) -> MetamerResult<()> {
    if grad.len() != expected {
        return Err(MetamerError::shape_mismatch((expected, 1), (grad.len(), 1), context));
    }
    Ok(())
}
