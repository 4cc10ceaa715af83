//! Run configuration loaded from TOML files.
//!
//! Three sections are recognised: `[model]`, `[synthesis]` and `[cache]`.
//! Every field has a default, so an empty file yields a retinal model with
//! scaling 0.5, Adam/AMSGrad synthesis and an in-memory window cache.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{ModelParams, DEFAULT_ORDER};
use crate::synthesis::{InitialImageType, LearningRateSchedule, OptimizerKind, SynthesisConfig};
use crate::windows::{WindowCache, WindowParams, WindowType, DEFAULT_MEMORY_CAPACITY};

/// Configuration of a full synthesis run.
///
/// # Examples
///
/// ```
/// use foveated_metamer_core::MetamerConfig;
///
/// let config = MetamerConfig::load_from_file("config/metamer.toml")
///     .unwrap_or_else(|_| MetamerConfig::default());
/// let params = config.model.to_params((128, 128));
/// assert_eq!(params.windows().image_resolution, (128, 128));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct MetamerConfig {
    pub model: ModelConfig,
    pub synthesis: SynthesisConfig,
    pub cache: CacheConfig,
}

impl MetamerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawMetamerConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Ok(Self {
            model: ModelConfig::try_from(&raw.model)?,
            synthesis: synthesis_from_raw(&raw.synthesis)?,
            cache: CacheConfig::from(&raw.cache),
        })
    }
}

/// Which model to build, minus the image resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub scaling: f64,
    pub min_eccentricity: f64,
    pub max_eccentricity: f64,
    pub num_scales: usize,
    pub window_type: WindowType,
    /// Pyramid order; ignored by the retinal model.
    pub order: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Retinal,
    Cortical,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Retinal,
            scaling: default_scaling(),
            min_eccentricity: default_min_eccentricity(),
            max_eccentricity: default_max_eccentricity(),
            num_scales: 1,
            window_type: WindowType::cosine(default_transition_region_width()),
            order: DEFAULT_ORDER,
        }
    }
}

impl ModelConfig {
    /// Model parameters for images of `resolution`. Values are checked when
    /// the model is built.
    pub fn to_params(&self, resolution: (usize, usize)) -> ModelParams {
        let windows = WindowParams::new(self.scaling, resolution)
            .with_eccentricity_range(self.min_eccentricity, self.max_eccentricity)
            .with_num_scales(self.num_scales)
            .with_window_type(self.window_type);
        match self.kind {
            ModelKind::Retinal => ModelParams::Retinal { windows },
            ModelKind::Cortical => ModelParams::Cortical {
                windows,
                order: self.order,
            },
        }
    }

    fn try_from(raw: &RawModel) -> Result<Self, ConfigError> {
        if !(raw.scaling > 0.0) {
            return Err(ConfigError::Parse("model.scaling must be positive".into()));
        }
        if !(raw.max_eccentricity > raw.min_eccentricity) {
            return Err(ConfigError::Parse(
                "model.max_eccentricity must exceed model.min_eccentricity".into(),
            ));
        }
        if raw.num_scales == 0 {
            return Err(ConfigError::Parse("model.num_scales must be at least 1".into()));
        }
        let window_type = match raw.window_type.as_str() {
            "cosine" => WindowType::cosine(raw.transition_region_width),
            "gaussian" => WindowType::gaussian(raw.std_dev),
            other => {
                return Err(ConfigError::Parse(format!(
                    "model.window_type must be 'cosine' or 'gaussian', got '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            kind: raw.kind,
            scaling: raw.scaling,
            min_eccentricity: raw.min_eccentricity,
            max_eccentricity: raw.max_eccentricity,
            num_scales: raw.num_scales,
            window_type,
            order: raw.order,
        })
    }
}

/// Where window banks are cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheConfig {
    /// Directory for persisted banks; memory only when absent.
    pub dir: Option<PathBuf>,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn build(&self) -> WindowCache {
        match &self.dir {
            Some(dir) => WindowCache::with_dir(dir.clone(), self.capacity),
            None => WindowCache::in_memory(self.capacity),
        }
    }
}

impl From<&RawCache> for CacheConfig {
    fn from(raw: &RawCache) -> Self {
        Self {
            dir: raw.dir.clone(),
            capacity: raw.capacity.max(1),
        }
    }
}

fn synthesis_from_raw(raw: &RawSynthesis) -> Result<SynthesisConfig, ConfigError> {
    let optimizer = match raw.optimizer.as_str() {
        "adam" => {
            let mut kind = OptimizerKind::default();
            if let OptimizerKind::Adam { amsgrad, .. } = &mut kind {
                *amsgrad = raw.amsgrad;
            }
            kind
        }
        "sgd" => OptimizerKind::Sgd {
            momentum: raw.momentum,
        },
        other => {
            return Err(ConfigError::Parse(format!(
                "synthesis.optimizer must be 'adam' or 'sgd', got '{}'",
                other
            )))
        }
    };
    let schedule = match raw.schedule.as_str() {
        "constant" => LearningRateSchedule::Constant,
        "step_decay" => LearningRateSchedule::StepDecay {
            step_size: raw.step_size,
            gamma: raw.gamma,
        },
        "plateau" => LearningRateSchedule::Plateau {
            factor: raw.gamma,
            patience: raw.patience,
            threshold: 1e-4,
            min_learning_rate: raw.min_learning_rate,
        },
        other => {
            return Err(ConfigError::Parse(format!(
                "synthesis.schedule must be 'constant', 'step_decay' or 'plateau', got '{}'",
                other
            )))
        }
    };

    let config = SynthesisConfig {
        initial_image: raw.initial_image,
        learning_rate: raw.learning_rate,
        max_iter: raw.max_iter,
        loss_threshold: raw.loss_threshold,
        seed: raw.seed,
        optimizer,
        schedule,
        clamp_range: (raw.clamp_min, raw.clamp_max),
        store_progress: raw.store_progress,
        progress_capacity: raw.progress_capacity,
        fraction_removed: raw.fraction_removed,
        log_path: raw.log_path.clone(),
    };
    config
        .validate()
        .map_err(|err| ConfigError::Parse(format!("synthesis: {}", err)))?;
    Ok(config)
}

#[derive(Debug, Deserialize)]
struct RawMetamerConfig {
    #[serde(default)]
    model: RawModel,
    #[serde(default)]
    synthesis: RawSynthesis,
    #[serde(default)]
    cache: RawCache,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(default = "default_kind")]
    kind: ModelKind,
    #[serde(default = "default_scaling")]
    scaling: f64,
    #[serde(default = "default_min_eccentricity")]
    min_eccentricity: f64,
    #[serde(default = "default_max_eccentricity")]
    max_eccentricity: f64,
    #[serde(default = "default_num_scales")]
    num_scales: usize,
    #[serde(default = "default_window_type")]
    window_type: String,
    #[serde(default = "default_transition_region_width")]
    transition_region_width: f64,
    #[serde(default = "default_std_dev")]
    std_dev: f64,
    #[serde(default = "default_order")]
    order: usize,
}

impl Default for RawModel {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            scaling: default_scaling(),
            min_eccentricity: default_min_eccentricity(),
            max_eccentricity: default_max_eccentricity(),
            num_scales: default_num_scales(),
            window_type: default_window_type(),
            transition_region_width: default_transition_region_width(),
            std_dev: default_std_dev(),
            order: default_order(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSynthesis {
    #[serde(default)]
    initial_image: InitialImageType,
    #[serde(default = "default_learning_rate")]
    learning_rate: f32,
    #[serde(default = "default_max_iter")]
    max_iter: usize,
    #[serde(default = "default_loss_threshold")]
    loss_threshold: f32,
    #[serde(default)]
    seed: u64,
    #[serde(default = "default_optimizer")]
    optimizer: String,
    #[serde(default = "default_amsgrad")]
    amsgrad: bool,
    #[serde(default)]
    momentum: f32,
    #[serde(default = "default_schedule")]
    schedule: String,
    #[serde(default = "default_step_size")]
    step_size: usize,
    #[serde(default = "default_gamma")]
    gamma: f32,
    #[serde(default = "default_patience")]
    patience: usize,
    #[serde(default)]
    min_learning_rate: f32,
    #[serde(default)]
    clamp_min: f32,
    #[serde(default = "default_clamp_max")]
    clamp_max: f32,
    #[serde(default)]
    store_progress: usize,
    #[serde(default = "default_progress_capacity")]
    progress_capacity: usize,
    #[serde(default)]
    fraction_removed: f32,
    #[serde(default)]
    log_path: Option<PathBuf>,
}

impl Default for RawSynthesis {
    fn default() -> Self {
        Self {
            initial_image: InitialImageType::default(),
            learning_rate: default_learning_rate(),
            max_iter: default_max_iter(),
            loss_threshold: default_loss_threshold(),
            seed: 0,
            optimizer: default_optimizer(),
            amsgrad: default_amsgrad(),
            momentum: 0.0,
            schedule: default_schedule(),
            step_size: default_step_size(),
            gamma: default_gamma(),
            patience: default_patience(),
            min_learning_rate: 0.0,
            clamp_min: 0.0,
            clamp_max: default_clamp_max(),
            store_progress: 0,
            progress_capacity: default_progress_capacity(),
            fraction_removed: 0.0,
            log_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCache {
    #[serde(default)]
    dir: Option<PathBuf>,
    #[serde(default = "default_capacity")]
    capacity: usize,
}

impl Default for RawCache {
    fn default() -> Self {
        Self {
            dir: None,
            capacity: default_capacity(),
        }
    }
}

fn default_kind() -> ModelKind {
    ModelKind::Retinal
}

fn default_scaling() -> f64 {
    0.5
}

fn default_min_eccentricity() -> f64 {
    0.5
}

fn default_max_eccentricity() -> f64 {
    15.0
}

fn default_num_scales() -> usize {
    1
}

fn default_window_type() -> String {
    "cosine".to_string()
}

fn default_transition_region_width() -> f64 {
    0.5
}

fn default_std_dev() -> f64 {
    1.0
}

fn default_order() -> usize {
    DEFAULT_ORDER
}

fn default_learning_rate() -> f32 {
    0.01
}

fn default_max_iter() -> usize {
    100
}

fn default_loss_threshold() -> f32 {
    1e-4
}

fn default_optimizer() -> String {
    "adam".to_string()
}

fn default_amsgrad() -> bool {
    true
}

fn default_schedule() -> String {
    "constant".to_string()
}

fn default_step_size() -> usize {
    50
}

fn default_gamma() -> f32 {
    0.5
}

fn default_patience() -> usize {
    10
}

fn default_clamp_max() -> f32 {
    1.0
}

fn default_progress_capacity() -> usize {
    100
}

fn default_capacity() -> usize {
    DEFAULT_MEMORY_CAPACITY
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metamer_config_defaults_when_sections_missing() {
        let config = MetamerConfig::from_str("").unwrap();
        assert_eq!(config, MetamerConfig::default());
        assert_eq!(config.synthesis, SynthesisConfig::default());
        assert_eq!(config.synthesis.initial_image, InitialImageType::White);
    }

    #[test]
    fn model_config_parses_custom_values() {
        let toml = "[model]\nkind = \"cortical\"\nscaling = 0.3\nnum_scales = 2\nwindow_type = \"gaussian\"\nstd_dev = 1.0\norder = 1";
        let config = MetamerConfig::from_str(toml).unwrap();
        assert_eq!(config.model.kind, ModelKind::Cortical);
        match config.model.to_params((64, 64)) {
            ModelParams::Cortical { windows, order } => {
                assert_eq!(order, 1);
                assert_eq!(windows.scaling, 0.3);
                assert_eq!(windows.num_scales, 2);
                assert_eq!(windows.window_type, WindowType::gaussian(1.0));
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn synthesis_config_parses_custom_values() {
        let toml = "[synthesis]\ninitial_image = \"gray\"\nlearning_rate = 0.05\nmax_iter = 12\noptimizer = \"sgd\"\nmomentum = 0.9\nschedule = \"step_decay\"\nstep_size = 4\ngamma = 0.25\nfraction_removed = 0.2";
        let config = MetamerConfig::from_str(toml).unwrap();
        let synthesis = config.synthesis;
        assert_eq!(synthesis.initial_image, InitialImageType::Gray);
        assert_eq!(synthesis.max_iter, 12);
        assert_eq!(synthesis.optimizer, OptimizerKind::Sgd { momentum: 0.9 });
        assert_eq!(
            synthesis.schedule,
            LearningRateSchedule::StepDecay {
                step_size: 4,
                gamma: 0.25
            }
        );
        assert_eq!(synthesis.fraction_removed, 0.2);
    }

    #[test]
    fn cache_config_builds_directory_cache() {
        let config = MetamerConfig::from_str("[cache]\ndir = \"target/windows\"\ncapacity = 2").unwrap();
        let cache = config.cache.build();
        assert_eq!(cache.dir(), Some(Path::new("target/windows")));
    }

    #[test]
    fn invalid_values_are_parse_errors() {
        for toml in [
            "[model]\nscaling = 0.0",
            "[model]\nwindow_type = \"square\"",
            "[synthesis]\nmax_iter = 0",
            "[synthesis]\noptimizer = \"lbfgs\"",
            "[synthesis]\nclamp_min = 1.0\nclamp_max = 0.0",
        ] {
            assert!(matches!(MetamerConfig::from_str(toml), Err(ConfigError::Parse(_))), "{toml}");
        }
    }
}
