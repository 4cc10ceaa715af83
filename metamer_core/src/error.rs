//! Error types for window construction, pooling models and synthesis
//!
//! Construction-time problems are reported as [`MetamerError::Configuration`]
//! before anything is allocated. Numeric failures during synthesis never
//! surface as `Err`: the engine reports them through its terminal status.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type MetamerResult<T> = Result<T, MetamerError>;

/// Error taxonomy for the metamer core
#[derive(Debug, Error)]
pub enum MetamerError {
    /// Invalid or inconsistent construction parameters
    #[error("invalid configuration for '{parameter}' = '{value}': {reason}")]
    Configuration {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Image resolution disagrees with the model or window bank
    #[error("shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
        context: String,
    },

    /// A cached window bank could not be read or describes other parameters
    #[error("window cache entry {path} is unusable: {details}")]
    CacheCorruption { path: String, details: String },

    /// Synthesis loss became NaN or infinite
    #[error("loss became non-finite ({loss}) at iteration {iteration}")]
    NonFiniteLoss { iteration: usize, loss: f32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary codec error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetamerError {
    /// Create a configuration error
    pub fn config(
        parameter: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        MetamerError::Configuration {
            parameter: parameter.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(
        expected: (usize, usize),
        got: (usize, usize),
        context: impl Into<String>,
    ) -> Self {
        MetamerError::ShapeMismatch {
            expected,
            got,
            context: context.into(),
        }
    }

    /// Create a cache corruption error
    pub fn cache_corruption(path: impl Into<String>, details: impl Into<String>) -> Self {
        MetamerError::CacheCorruption {
            path: path.into(),
            details: details.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, MetamerError::Configuration { .. })
    }

    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, MetamerError::ShapeMismatch { .. })
    }
}
