//! # Foveated Metamer Core
//!
//! Image-computable models of peripheral vision built from log-polar pooling
//! windows, plus a gradient-based engine that synthesizes model metamers:
//! images whose pooled representation matches that of a reference.
//!
//! ## Quick Start
//!
//! ```rust
//! use foveated_metamer_core::{
//!     InitialImageType, MetamerSynthesis, RetinalModel, SynthesisConfig, WindowCache,
//!     WindowParams,
//! };
//! use ndarray::Array2;
//!
//! let cache = WindowCache::default();
//! let model = RetinalModel::new(WindowParams::new(0.5, (32, 32)), &cache).unwrap();
//!
//! let reference = Array2::from_shape_fn((32, 32), |(r, c)| ((r + c) % 7) as f32 / 6.0);
//! let config = SynthesisConfig {
//!     initial_image: InitialImageType::Pink,
//!     max_iter: 20,
//!     ..Default::default()
//! };
//! let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).unwrap();
//! let status = synthesis.run().unwrap();
//! println!("{:?} after {} iterations", status, synthesis.state().iteration_count);
//! ```
//!
//! ## Core Modules
//!
//! - [`windows`] - Window geometry, window banks and the window cache
//! - [`pooling`] - Sparse pooling operator and its adjoint
//! - [`spectral`] - 2-D FFT helpers and the complex steerable pyramid
//! - [`model`] - Retinal and cortical representation models
//! - [`synthesis`] - Metamer synthesis engine
//! - [`config`] - Run configuration via TOML
//! - [`logging`] - JSON line-delimited iteration logs

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod logging;
pub mod loss;
pub mod model;
pub mod pooling;
pub mod spectral;
pub mod synthesis;
pub mod windows;

pub use checkpoint::{load_bank_for, Checkpointable};
pub use config::{CacheConfig, ConfigError, MetamerConfig, ModelConfig, ModelKind};
pub use error::{MetamerError, MetamerResult};
pub use loss::{mse_gradient, mse_loss};
pub use model::{
    ChannelKind, CorticalModel, ModelDetail, ModelOutput, ModelParams, RepresentationLayout,
    RepresentationModel, RetinalModel, VisualModel,
};
pub use pooling::PoolingOperator;
pub use spectral::{max_pyramid_height, SteerablePyramid};
pub use synthesis::{
    CancellationToken, InitialImageType, LearningRateSchedule, MetamerSynthesis, OptimizerKind,
    ProgressLog, ProgressSnapshot, SynthesisConfig, SynthesisState, SynthesisStatus,
    SynthesisSummary,
};
pub use windows::{
    calc_angular_n_windows, calc_angular_window_spacing, calc_eccentricity_n_windows,
    calc_eccentricity_window_spacing, calc_min_eccentricity, calc_scaling, WindowBank,
    WindowCache, WindowGeometry, WindowParams, WindowType, WindowWidths,
};
