//! Metamer synthesis engine.
//!
//! Starting from a noise (or gray) image whose uncovered pixels are copied
//! from the reference, the engine repeatedly
//!
//! 1. takes the gradient of the representation MSE at the current image,
//! 2. applies one optimizer step and clamps the proposal into `[lo, hi]`,
//! 3. evaluates the proposal and commits it only if image and loss are
//!    finite.
//!
//! A run ends `Converged` once the loss drops below the threshold,
//! `Exhausted` after `max_iter` committed iterations, `Failed` on a
//! non-finite proposal (the last finite state is kept) or `Cancelled` when
//! its [`CancellationToken`] fires. `Err` is reserved for invalid
//! configuration and programmer errors.

pub mod initial;
pub mod optimizer;
pub mod schedule;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};
use crate::logging;
use crate::loss::{mse_gradient, mse_loss};
use crate::model::{ModelOutput, ModelParams, VisualModel};

pub use initial::{seed_uncovered, InitialImageType};
pub use optimizer::{AdamOptimizer, Optimizer, OptimizerKind, SgdOptimizer};
pub use schedule::{LearningRateSchedule, Scheduler};

/// Hyperparameters of one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub initial_image: InitialImageType,
    pub learning_rate: f32,
    pub max_iter: usize,
    pub loss_threshold: f32,
    pub seed: u64,
    pub optimizer: OptimizerKind,
    pub schedule: LearningRateSchedule,
    /// Inclusive `(lo, hi)` range every committed image lies in.
    pub clamp_range: (f32, f32),
    /// Snapshot every this many iterations; 0 disables snapshots.
    pub store_progress: usize,
    /// Maximum number of snapshots kept.
    pub progress_capacity: usize,
    /// Fraction of representation entries left out of each gradient.
    pub fraction_removed: f32,
    /// Optional JSON-lines file receiving one record per iteration.
    pub log_path: Option<PathBuf>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            initial_image: InitialImageType::default(),
            learning_rate: 0.01,
            max_iter: 100,
            loss_threshold: 1e-4,
            seed: 0,
            optimizer: OptimizerKind::default(),
            schedule: LearningRateSchedule::default(),
            clamp_range: (0.0, 1.0),
            store_progress: 0,
            progress_capacity: 100,
            fraction_removed: 0.0,
            log_path: None,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> MetamerResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MetamerError::config(
                "learning_rate",
                self.learning_rate,
                "must be positive",
            ));
        }
        if self.max_iter == 0 {
            return Err(MetamerError::config("max_iter", self.max_iter, "must be at least 1"));
        }
        if !self.loss_threshold.is_finite() || self.loss_threshold < 0.0 {
            return Err(MetamerError::config(
                "loss_threshold",
                self.loss_threshold,
                "must be non-negative",
            ));
        }
        let (lo, hi) = self.clamp_range;
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(MetamerError::config(
                "clamp_range",
                format!("({lo}, {hi})"),
                "needs finite bounds with lo < hi",
            ));
        }
        if !(0.0..1.0).contains(&self.fraction_removed) {
            return Err(MetamerError::config(
                "fraction_removed",
                self.fraction_removed,
                "must lie in [0, 1)",
            ));
        }
        if self.store_progress > 0 && self.progress_capacity == 0 {
            return Err(MetamerError::config(
                "progress_capacity",
                self.progress_capacity,
                "must be positive when progress is stored",
            ));
        }
        self.optimizer.validate()?;
        self.schedule.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStatus {
    Initialized,
    Iterating,
    Converged,
    Exhausted,
    Failed,
    Cancelled,
}

impl SynthesisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SynthesisStatus::Converged
                | SynthesisStatus::Exhausted
                | SynthesisStatus::Failed
                | SynthesisStatus::Cancelled
        )
    }
}

/// Shared stop flag checked once per iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub iteration: usize,
    pub loss: f32,
    pub image: Array2<f32>,
    pub representation: Array1<f32>,
}

/// Bounded, append-only list of snapshots.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    stride: usize,
    capacity: usize,
    snapshots: Vec<ProgressSnapshot>,
    dropped: usize,
}

impl ProgressLog {
    pub fn new(stride: usize, capacity: usize) -> Self {
        Self {
            stride,
            capacity,
            snapshots: Vec::new(),
            dropped: 0,
        }
    }

    pub fn snapshots(&self) -> &[ProgressSnapshot] {
        &self.snapshots
    }

    /// Snapshots that were due but did not fit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn is_due(&self, iteration: usize) -> bool {
        self.stride > 0 && iteration % self.stride == 0
    }

    fn record(&mut self, snapshot: ProgressSnapshot) {
        if self.snapshots.len() < self.capacity {
            self.snapshots.push(snapshot);
            return;
        }
        if self.dropped == 0 {
            tracing::warn!(
                capacity = self.capacity,
                iteration = snapshot.iteration,
                "progress log is full; further snapshots are discarded"
            );
        }
        self.dropped += 1;
    }
}

/// Everything a run owns.
#[derive(Debug)]
pub struct SynthesisState {
    pub target_representation: Array1<f32>,
    pub candidate_image: Array2<f32>,
    pub candidate_representation: Array1<f32>,
    /// Loss of the initial image followed by one entry per committed
    /// iteration.
    pub loss_history: Vec<f32>,
    pub learning_rate_history: Vec<f32>,
    pub iteration_count: usize,
    pub status: SynthesisStatus,
    pub progress: ProgressLog,
    /// Why the run failed, when `status` is `Failed`.
    pub failure: Option<MetamerError>,
}

impl SynthesisState {
    pub fn final_loss(&self) -> Option<f32> {
        self.loss_history.last().copied()
    }
}

/// Serializable record of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisSummary {
    pub model: ModelParams,
    pub config: SynthesisConfig,
    pub status: SynthesisStatus,
    pub iteration_count: usize,
    pub loss_history: Vec<f32>,
    pub learning_rate_history: Vec<f32>,
    pub final_loss: Option<f32>,
    pub snapshots_stored: usize,
    pub snapshots_dropped: usize,
    pub failure: Option<String>,
}

impl SynthesisSummary {
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> MetamerResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> MetamerResult<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Drives one synthesis run against a model.
pub struct MetamerSynthesis<'m, M: VisualModel + ?Sized> {
    model: &'m M,
    config: SynthesisConfig,
    coverage: Array2<f32>,
    output: ModelOutput,
    optimizer: Optimizer,
    scheduler: Scheduler,
    rng: StdRng,
    cancel: CancellationToken,
    state: SynthesisState,
}

impl<'m, M: VisualModel + ?Sized> MetamerSynthesis<'m, M> {
    /// Validates inputs, computes the target representation and evaluates
    /// the initial image.
    pub fn new(
        model: &'m M,
        reference: ArrayView2<'_, f32>,
        config: SynthesisConfig,
    ) -> MetamerResult<Self> {
        config.validate()?;
        validate_reference(reference)?;
        let resolution = model.image_resolution();
        if reference.dim() != resolution {
            return Err(MetamerError::shape_mismatch(resolution, reference.dim(), "reference image"));
        }

        let target_representation = model.forward(reference)?.representation;
        let coverage = model
            .window_bank()
            .scale(0)
            .map(|windows| windows.coverage())
            .ok_or_else(|| MetamerError::config("num_scales", 0, "window bank has no scales"))?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let noise = config.initial_image.generate(resolution, &mut rng);
        let (lo, hi) = config.clamp_range;
        let initial = seed_uncovered(&noise, reference, coverage.view()).mapv(|v| v.clamp(lo, hi));

        let output = model.forward(initial.view())?;
        let initial_loss = mse_loss(output.representation.view(), target_representation.view())?;
        tracing::info!(
            model = model.params().name(),
            initial = config.initial_image.name(),
            loss = initial_loss,
            max_iter = config.max_iter,
            "starting metamer synthesis"
        );

        let state = SynthesisState {
            target_representation,
            candidate_image: initial,
            candidate_representation: output.representation.clone(),
            loss_history: vec![initial_loss],
            learning_rate_history: Vec::new(),
            iteration_count: 0,
            status: SynthesisStatus::Initialized,
            progress: ProgressLog::new(config.store_progress, config.progress_capacity),
            failure: None,
        };

        let mut synthesis = Self {
            model,
            optimizer: Optimizer::new(config.optimizer, config.learning_rate),
            scheduler: Scheduler::new(config.schedule, config.learning_rate),
            config,
            coverage,
            output,
            rng,
            cancel: CancellationToken::new(),
            state,
        };
        synthesis.maybe_snapshot();
        Ok(synthesis)
    }

    /// Replaces the run's cancellation flag with a shared one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &SynthesisState {
        &self.state
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn into_state(self) -> SynthesisState {
        self.state
    }

    /// Runs one iteration. Terminal runs are left untouched.
    pub fn step(&mut self) -> MetamerResult<SynthesisStatus> {
        if self.state.status.is_terminal() {
            return Ok(self.state.status);
        }
        if self.cancel.is_cancelled() {
            tracing::info!(iteration = self.state.iteration_count, "synthesis cancelled");
            self.state.status = SynthesisStatus::Cancelled;
            return Ok(self.state.status);
        }
        self.state.status = SynthesisStatus::Iterating;
        let iteration = self.state.iteration_count + 1;

        let keep = self.draw_keep_mask();
        let rep_grad = mse_gradient(
            self.output.representation.view(),
            self.state.target_representation.view(),
            keep.as_deref(),
        )?;
        let mut image_grad = self.model.backward(&self.output, rep_grad.view())?;
        // uncovered pixels stay equal to the reference
        image_grad *= &self.coverage;
        let gradient_norm = image_grad.iter().map(|&g| (g as f64).powi(2)).sum::<f64>().sqrt() as f32;

        let learning_rate = self.scheduler.learning_rate();
        self.optimizer.set_learning_rate(learning_rate);
        let mut proposal = self.state.candidate_image.clone();
        self.optimizer.step(&mut proposal, &image_grad);
        let (lo, hi) = self.config.clamp_range;
        proposal.mapv_inplace(|v| v.clamp(lo, hi));

        if !proposal.iter().all(|v| v.is_finite()) {
            return Ok(self.fail(iteration, f32::NAN));
        }
        let output = self.model.forward(proposal.view())?;
        let loss = mse_loss(output.representation.view(), self.state.target_representation.view())?;
        if !loss.is_finite() {
            return Ok(self.fail(iteration, loss));
        }

        let pixel_change = Zip::from(&proposal)
            .and(&self.state.candidate_image)
            .fold(0.0f32, |acc, &a, &b| acc.max((a - b).abs()));
        self.state.candidate_image = proposal;
        self.state.candidate_representation = output.representation.clone();
        self.output = output;
        self.state.loss_history.push(loss);
        self.state.learning_rate_history.push(learning_rate);
        self.state.iteration_count = iteration;
        self.scheduler.observe(iteration, loss);
        self.maybe_snapshot();

        if loss < self.config.loss_threshold {
            self.state.status = SynthesisStatus::Converged;
        } else if iteration >= self.config.max_iter {
            self.state.status = SynthesisStatus::Exhausted;
        }

        tracing::debug!(iteration, loss, learning_rate, gradient_norm, pixel_change, "synthesis step");
        if let Some(path) = &self.config.log_path {
            // the iteration is committed; a lost log line must not change the outcome
            if let Err(err) = logging::log_synthesis_iteration(
                path,
                iteration,
                loss,
                learning_rate,
                gradient_norm,
                pixel_change,
            ) {
                tracing::warn!(error = %err, path = %path.display(), "iteration log write failed");
            }
        }
        if self.state.status.is_terminal() {
            tracing::info!(
                status = ?self.state.status,
                iterations = iteration,
                loss,
                "synthesis finished"
            );
        }
        Ok(self.state.status)
    }

    /// Steps until the run reaches a terminal status.
    pub fn run(&mut self) -> MetamerResult<SynthesisStatus> {
        loop {
            let status = self.step()?;
            if status.is_terminal() {
                return Ok(status);
            }
        }
    }

    pub fn summary(&self) -> SynthesisSummary {
        SynthesisSummary {
            model: self.model.params(),
            config: self.config.clone(),
            status: self.state.status,
            iteration_count: self.state.iteration_count,
            loss_history: self.state.loss_history.clone(),
            learning_rate_history: self.state.learning_rate_history.clone(),
            final_loss: self.state.final_loss(),
            snapshots_stored: self.state.progress.snapshots().len(),
            snapshots_dropped: self.state.progress.dropped(),
            failure: self.state.failure.as_ref().map(ToString::to_string),
        }
    }

    fn draw_keep_mask(&mut self) -> Option<Vec<bool>> {
        let fraction = self.config.fraction_removed;
        if fraction <= 0.0 {
            return None;
        }
        let len = self.state.target_representation.len();
        Some((0..len).map(|_| self.rng.gen::<f32>() >= fraction).collect())
    }

    fn fail(&mut self, iteration: usize, loss: f32) -> SynthesisStatus {
        let err = MetamerError::NonFiniteLoss { iteration, loss };
        tracing::warn!(error = %err, "synthesis stopped; keeping last finite state");
        self.state.failure = Some(err);
        self.state.status = SynthesisStatus::Failed;
        self.state.status
    }

    fn maybe_snapshot(&mut self) {
        let iteration = self.state.iteration_count;
        if !self.state.progress.is_due(iteration) {
            return;
        }
        let snapshot = ProgressSnapshot {
            iteration,
            loss: self.state.loss_history.last().copied().unwrap_or(f32::NAN),
            image: self.state.candidate_image.clone(),
            representation: self.state.candidate_representation.clone(),
        };
        self.state.progress.record(snapshot);
    }
}

fn validate_reference(reference: ArrayView2<'_, f32>) -> MetamerResult<()> {
    let (h, w) = reference.dim();
    if h == 0 || w == 0 {
        return Err(MetamerError::config("reference", format!("{h}x{w}"), "image is empty"));
    }
    if let Some(bad) = reference.iter().find(|v| !v.is_finite() || !(0.0..=1.0).contains(*v)) {
        return Err(MetamerError::config(
            "reference",
            bad,
            "pixel values must be finite and lie in [0, 1]",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RepresentationLayout, RetinalModel};
    use crate::windows::{WindowBank, WindowCache, WindowParams};
    use ndarray::ArrayView1;

    fn retinal() -> RetinalModel {
        RetinalModel::new(WindowParams::new(0.5, (32, 32)), &WindowCache::default()).expect("model")
    }

    fn textured_reference() -> Array2<f32> {
        Array2::from_shape_fn((32, 32), |(r, c)| ((r * 3 + c * 5) % 11) as f32 / 10.0)
    }

    /// Retinal model whose gradients are all NaN.
    struct UnstableModel(RetinalModel);

    impl VisualModel for UnstableModel {
        fn params(&self) -> ModelParams {
            self.0.params()
        }

        fn window_bank(&self) -> &Arc<WindowBank> {
            self.0.window_bank()
        }

        fn layout(&self) -> &RepresentationLayout {
            self.0.layout()
        }

        fn forward(&self, image: ArrayView2<'_, f32>) -> MetamerResult<ModelOutput> {
            self.0.forward(image)
        }

        fn backward(&self, output: &ModelOutput, _grad: ArrayView1<'_, f32>) -> MetamerResult<Array2<f32>> {
            Ok(Array2::from_elem(output.image.dim(), f32::NAN))
        }
    }

    #[test]
    fn non_finite_update_fails_and_keeps_last_state() {
        let model = UnstableModel(retinal());
        let reference = textured_reference();
        let config = SynthesisConfig {
            initial_image: InitialImageType::White,
            max_iter: 10,
            ..Default::default()
        };
        let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).expect("init");
        let initial = synthesis.state().candidate_image.clone();

        assert_eq!(synthesis.run().expect("run"), SynthesisStatus::Failed);
        let state = synthesis.state();
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.loss_history.len(), 1);
        assert_eq!(state.candidate_image, initial);
        assert!(state.candidate_image.iter().all(|v| v.is_finite()));
        assert!(matches!(
            state.failure,
            Some(MetamerError::NonFiniteLoss { iteration: 1, .. })
        ));

        assert_eq!(synthesis.step().expect("step"), SynthesisStatus::Failed);
        assert_eq!(synthesis.state().iteration_count, 0);
        assert_eq!(synthesis.summary().status, SynthesisStatus::Failed);
    }

    #[test]
    fn unwritable_iteration_log_does_not_change_the_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = retinal();
        let reference = Array2::from_elem((32, 32), 0.5f32);
        let config = SynthesisConfig {
            initial_image: InitialImageType::Gray,
            max_iter: 5,
            // a directory cannot be opened for appending
            log_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).expect("init");
        assert_eq!(synthesis.step().expect("step"), SynthesisStatus::Converged);
        assert_eq!(synthesis.state().iteration_count, 1);
        assert_eq!(synthesis.step().expect("step"), SynthesisStatus::Converged);
        assert_eq!(synthesis.state().iteration_count, 1);
    }

    #[test]
    fn out_of_range_reference_is_rejected() {
        let model = retinal();
        let mut reference = textured_reference();
        reference[[3, 4]] = 1.5;
        let err = MetamerSynthesis::new(&model, reference.view(), SynthesisConfig::default())
            .err()
            .expect("rejected");
        assert!(err.is_configuration());

        reference[[3, 4]] = f32::NAN;
        assert!(MetamerSynthesis::new(&model, reference.view(), SynthesisConfig::default()).is_err());
    }

    #[test]
    fn wrong_sized_reference_is_a_shape_mismatch() {
        let model = retinal();
        let reference = Array2::from_elem((16, 16), 0.5f32);
        let err = MetamerSynthesis::new(&model, reference.view(), SynthesisConfig::default())
            .err()
            .expect("rejected");
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let model = retinal();
        let reference = textured_reference();
        for config in [
            SynthesisConfig { learning_rate: 0.0, ..Default::default() },
            SynthesisConfig { max_iter: 0, ..Default::default() },
            SynthesisConfig { clamp_range: (1.0, 0.0), ..Default::default() },
            SynthesisConfig { fraction_removed: 1.0, ..Default::default() },
        ] {
            assert!(MetamerSynthesis::new(&model, reference.view(), config).is_err());
        }
    }

    #[test]
    fn fovea_is_copied_and_never_changes() {
        let model = retinal();
        let reference = textured_reference();
        let config = SynthesisConfig {
            initial_image: InitialImageType::White,
            max_iter: 5,
            learning_rate: 0.05,
            ..Default::default()
        };
        let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).expect("init");
        let coverage = model.window_bank().scales()[0].coverage();
        synthesis.run().expect("run");
        let state = synthesis.state();
        for ((idx, &cov), &value) in coverage.indexed_iter().zip(state.candidate_image.iter()) {
            if cov == 0.0 {
                assert_eq!(value, reference[idx]);
            }
        }
    }

    #[test]
    fn loss_decreases_and_history_is_complete() {
        let model = retinal();
        let reference = textured_reference();
        let config = SynthesisConfig {
            initial_image: InitialImageType::Gray,
            max_iter: 30,
            learning_rate: 0.05,
            loss_threshold: 0.0,
            ..Default::default()
        };
        let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).expect("init");
        assert_eq!(synthesis.run().expect("run"), SynthesisStatus::Exhausted);
        let state = synthesis.state();
        assert_eq!(state.iteration_count, 30);
        assert_eq!(state.loss_history.len(), 31);
        assert_eq!(state.learning_rate_history.len(), 30);
        assert!(state.loss_history[30] < state.loss_history[0]);
        assert!(state.candidate_image.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn cancellation_stops_at_the_next_boundary() {
        let model = retinal();
        let reference = textured_reference();
        let token = CancellationToken::new();
        let mut synthesis = MetamerSynthesis::new(&model, reference.view(), SynthesisConfig::default())
            .expect("init")
            .with_cancellation(token.clone());
        synthesis.step().expect("step");
        token.cancel();
        assert_eq!(synthesis.step().expect("step"), SynthesisStatus::Cancelled);
        assert_eq!(synthesis.state().iteration_count, 1);
        // terminal runs stay put
        assert_eq!(synthesis.step().expect("step"), SynthesisStatus::Cancelled);
    }

    #[test]
    fn progress_log_is_bounded() {
        let model = retinal();
        let reference = textured_reference();
        let config = SynthesisConfig {
            max_iter: 10,
            loss_threshold: 0.0,
            store_progress: 2,
            progress_capacity: 3,
            ..Default::default()
        };
        let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).expect("init");
        synthesis.run().expect("run");
        let progress = &synthesis.state().progress;
        let iterations: Vec<_> = progress.snapshots().iter().map(|s| s.iteration).collect();
        assert_eq!(iterations, vec![0, 2, 4]);
        assert_eq!(progress.dropped(), 3);
    }

    #[test]
    fn summary_serializes_status_and_history() {
        let model = retinal();
        let reference = textured_reference();
        let config = SynthesisConfig {
            max_iter: 3,
            loss_threshold: 0.0,
            fraction_removed: 0.3,
            ..Default::default()
        };
        let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config).expect("init");
        synthesis.run().expect("run");
        let summary = synthesis.summary();
        let json = serde_json::to_value(&summary).expect("json");
        assert_eq!(json["status"], "exhausted");
        assert_eq!(json["iteration_count"], 3);
        assert_eq!(json["model"]["model"], "retinal");
        assert_eq!(summary.loss_history.len(), 4);
    }
}
