//! First-order optimizers for the candidate image.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};

/// Optimizer choice and its hyperparameters (the learning rate lives in the
/// synthesis configuration).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Stochastic gradient descent with heavy-ball momentum.
    Sgd {
        #[serde(default)]
        momentum: f32,
    },
    /// Adam, optionally with the AMSGrad correction.
    Adam {
        #[serde(default = "default_beta1")]
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
        #[serde(default = "default_amsgrad")]
        amsgrad: bool,
    },
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-8
}

fn default_amsgrad() -> bool {
    true
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam {
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
            amsgrad: default_amsgrad(),
        }
    }
}

impl OptimizerKind {
    pub fn validate(&self) -> MetamerResult<()> {
        match *self {
            OptimizerKind::Sgd { momentum } => {
                if !(0.0..1.0).contains(&momentum) {
                    return Err(MetamerError::config("momentum", momentum, "must lie in [0, 1)"));
                }
            }
            OptimizerKind::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => {
                for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                    if !(0.0..1.0).contains(&beta) {
                        return Err(MetamerError::config(name, beta, "must lie in [0, 1)"));
                    }
                }
                if !epsilon.is_finite() || epsilon <= 0.0 {
                    return Err(MetamerError::config("epsilon", epsilon, "must be positive"));
                }
            }
        }
        Ok(())
    }
}

/// SGD with momentum.
///
/// ```text
/// velocity = momentum * velocity + gradient
/// parameter = parameter - learning_rate * velocity
/// ```
#[derive(Debug, Clone)]
pub struct SgdOptimizer {
    /// Step size, updated by the schedule before every step.
    pub learning_rate: f32,
    /// Fraction of the previous velocity carried into the next step; 0 is
    /// plain gradient descent.
    pub momentum: f32,
    velocity: Option<Array2<f32>>,
}

impl SgdOptimizer {
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: None,
        }
    }

    pub fn step(&mut self, param: &mut Array2<f32>, gradient: &Array2<f32>) {
        let velocity = self
            .velocity
            .get_or_insert_with(|| Array2::zeros(param.dim()));
        let (lr, momentum) = (self.learning_rate, self.momentum);
        Zip::from(param)
            .and(velocity)
            .and(gradient)
            .for_each(|p, v, &g| {
                *v = momentum * *v + g;
                *p -= lr * *v;
            });
    }

    pub fn reset(&mut self) {
        self.velocity = None;
    }
}

/// Adam (Adaptive Moment Estimation) with optional AMSGrad.
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    /// Step size, updated by the schedule before every step.
    pub learning_rate: f32,
    /// Decay rate of the first moment estimate.
    pub beta1: f32,
    /// Decay rate of the second moment estimate.
    pub beta2: f32,
    /// Added to the denominator to avoid division by zero.
    pub epsilon: f32,
    /// Normalize by the running maximum of the second moment instead of
    /// its current value.
    pub amsgrad: bool,
    first_moment: Option<Array2<f32>>,
    second_moment: Option<Array2<f32>>,
    /// Running maximum of the second moment, used with AMSGrad.
    max_second_moment: Option<Array2<f32>>,
    t: i32,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32, amsgrad: bool) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            amsgrad,
            first_moment: None,
            second_moment: None,
            max_second_moment: None,
            t: 0,
        }
    }

    pub fn step(&mut self, param: &mut Array2<f32>, gradient: &Array2<f32>) {
        self.t += 1;
        let dim = param.dim();
        let m = self.first_moment.get_or_insert_with(|| Array2::zeros(dim));
        let v = self.second_moment.get_or_insert_with(|| Array2::zeros(dim));
        let v_max = self.max_second_moment.get_or_insert_with(|| Array2::zeros(dim));

        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let amsgrad = self.amsgrad;
        let bias1 = 1.0 - beta1.powi(self.t);
        let bias2_sqrt = (1.0 - beta2.powi(self.t)).sqrt();
        let step_size = lr / bias1;

        Zip::from(param)
            .and(m)
            .and(v)
            .and(v_max)
            .and(gradient)
            .for_each(|p, m, v, v_max, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let second = if amsgrad {
                    *v_max = v_max.max(*v);
                    *v_max
                } else {
                    *v
                };
                let denom = second.sqrt() / bias2_sqrt + eps;
                *p -= step_size * *m / denom;
            });
    }

    pub fn reset(&mut self) {
        self.first_moment = None;
        self.second_moment = None;
        self.max_second_moment = None;
        self.t = 0;
    }
}

/// Optimizer driving one synthesis run.
#[derive(Debug, Clone)]
pub enum Optimizer {
    Sgd(SgdOptimizer),
    Adam(AdamOptimizer),
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f32) -> Self {
        match kind {
            OptimizerKind::Sgd { momentum } => Optimizer::Sgd(SgdOptimizer::new(learning_rate, momentum)),
            OptimizerKind::Adam {
                beta1,
                beta2,
                epsilon,
                amsgrad,
            } => Optimizer::Adam(AdamOptimizer::new(learning_rate, beta1, beta2, epsilon, amsgrad)),
        }
    }

    pub fn step(&mut self, param: &mut Array2<f32>, gradient: &Array2<f32>) {
        match self {
            Optimizer::Sgd(opt) => opt.step(param, gradient),
            Optimizer::Adam(opt) => opt.step(param, gradient),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match self {
            Optimizer::Sgd(opt) => opt.learning_rate,
            Optimizer::Adam(opt) => opt.learning_rate,
        }
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        match self {
            Optimizer::Sgd(opt) => opt.learning_rate = learning_rate,
            Optimizer::Adam(opt) => opt.learning_rate = learning_rate,
        }
    }
}
