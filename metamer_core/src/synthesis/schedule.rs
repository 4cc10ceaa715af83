//! Learning-rate schedules.

use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningRateSchedule {
    #[default]
    Constant,
    /// Multiply by `gamma` every `step_size` iterations.
    StepDecay { step_size: usize, gamma: f32 },
    /// Multiply by `factor` once the loss has not improved by a relative
    /// `threshold` for more than `patience` iterations.
    Plateau {
        factor: f32,
        patience: usize,
        #[serde(default = "default_threshold")]
        threshold: f32,
        #[serde(default)]
        min_learning_rate: f32,
    },
}

fn default_threshold() -> f32 {
    1e-4
}

impl LearningRateSchedule {
    pub fn validate(&self) -> MetamerResult<()> {
        match *self {
            LearningRateSchedule::Constant => {}
            LearningRateSchedule::StepDecay { step_size, gamma } => {
                if step_size == 0 {
                    return Err(MetamerError::config("step_size", step_size, "must be at least 1"));
                }
                if !(gamma > 0.0 && gamma <= 1.0) {
                    return Err(MetamerError::config("gamma", gamma, "must lie in (0, 1]"));
                }
            }
            LearningRateSchedule::Plateau {
                factor,
                threshold,
                min_learning_rate,
                ..
            } => {
                if !(factor > 0.0 && factor < 1.0) {
                    return Err(MetamerError::config("factor", factor, "must lie in (0, 1)"));
                }
                if !threshold.is_finite() || threshold < 0.0 {
                    return Err(MetamerError::config("threshold", threshold, "must be non-negative"));
                }
                if !min_learning_rate.is_finite() || min_learning_rate < 0.0 {
                    return Err(MetamerError::config(
                        "min_learning_rate",
                        min_learning_rate,
                        "must be non-negative",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Tracks the learning rate of one run.
#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule: LearningRateSchedule,
    base: f32,
    current: f32,
    best_loss: f32,
    stale_iterations: usize,
}

impl Scheduler {
    pub fn new(schedule: LearningRateSchedule, learning_rate: f32) -> Self {
        Self {
            schedule,
            base: learning_rate,
            current: learning_rate,
            best_loss: f32::INFINITY,
            stale_iterations: 0,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.current
    }

    /// Records the loss after `iterations` completed iterations and returns
    /// the learning rate for the next one.
    pub fn observe(&mut self, iterations: usize, loss: f32) -> f32 {
        match self.schedule {
            LearningRateSchedule::Constant => {}
            LearningRateSchedule::StepDecay { step_size, gamma } => {
                let decays = (iterations / step_size) as i32;
                self.current = self.base * gamma.powi(decays);
            }
            LearningRateSchedule::Plateau {
                factor,
                patience,
                threshold,
                min_learning_rate,
            } => {
                if loss < self.best_loss * (1.0 - threshold) {
                    self.best_loss = loss;
                    self.stale_iterations = 0;
                } else {
                    self.stale_iterations += 1;
                }
                if self.stale_iterations > patience {
                    self.current = (self.current * factor).max(min_learning_rate);
                    self.stale_iterations = 0;
                }
            }
        }
        self.current
    }
}
