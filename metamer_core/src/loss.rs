use ndarray::{Array1, ArrayView1};

use crate::error::{MetamerError, MetamerResult};

/// Mean squared error between two representations.
///
/// Accumulates sequentially in `f64` so the value does not depend on thread
/// scheduling.
pub fn mse_loss(current: ArrayView1<'_, f32>, target: ArrayView1<'_, f32>) -> MetamerResult<f32> {
    check_lengths(current, target)?;
    if current.is_empty() {
        return Ok(0.0);
    }
    let total: f64 = current
        .iter()
        .zip(target.iter())
        .map(|(&lhs, &rhs)| {
            let diff = lhs as f64 - rhs as f64;
            diff * diff
        })
        .sum();
    Ok((total / current.len() as f64) as f32)
}

/// Gradient of [`mse_loss`] with respect to `current`.
///
/// With a `keep` mask, the loss is the mean over kept entries only and
/// dropped entries receive zero gradient.
pub fn mse_gradient(
    current: ArrayView1<'_, f32>,
    target: ArrayView1<'_, f32>,
    keep: Option<&[bool]>,
) -> MetamerResult<Array1<f32>> {
    check_lengths(current, target)?;
    if let Some(keep) = keep {
        if keep.len() != current.len() {
            return Err(MetamerError::shape_mismatch(
                (current.len(), 1),
                (keep.len(), 1),
                "loss mask",
            ));
        }
    }
    let kept = keep.map_or(current.len(), |k| k.iter().filter(|&&b| b).count());
    if kept == 0 {
        return Ok(Array1::zeros(current.len()));
    }
    let scale = 2.0 / kept as f32;
    Ok(Array1::from_shape_fn(current.len(), |i| {
        if keep.map_or(true, |k| k[i]) {
            scale * (current[i] - target[i])
        } else {
            0.0
        }
    }))
}

fn check_lengths(current: ArrayView1<'_, f32>, target: ArrayView1<'_, f32>) -> MetamerResult<()> {
    if current.len() != target.len() {
        return Err(MetamerError::shape_mismatch(
            (target.len(), 1),
            (current.len(), 1),
            "representation loss",
        ));
    }
    Ok(())
}
