//! Gradient-based coordinate refinement against the reconstruction loss.
//!
//! Types and atom count are fixed; only coordinates move. Updates are Adam
//! with a configurable learning rate and fixed moment constants, run for a
//! fixed step budget — convergence is not required. The refiner returns the
//! best-loss iterate it saw, so a refined hypothesis never scores worse than
//! its starting point.

use super::config::RefinementConfig;
use crate::core::grid::tensor::GridTensor;
use crate::core::render::GridRenderer;
use nalgebra::{Point3, Vector3};
use tracing::trace;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

/// The best iterate found during a refinement run.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub coords: Vec<Point3<f64>>,
    pub rendered: GridTensor,
    pub loss: f64,
}

#[derive(Debug, Clone)]
pub struct Refiner {
    learning_rate: f64,
}

impl Refiner {
    pub fn new(config: &RefinementConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
        }
    }

    /// Runs `steps` Adam updates of `coords` against `target` and returns the
    /// lowest-loss iterate encountered (including the starting point).
    ///
    /// Deterministic: identical inputs and budget produce identical output.
    pub fn refine(
        &self,
        renderer: &GridRenderer,
        coords: &[Point3<f64>],
        types: &[Vec<f64>],
        radii: &[f64],
        target: &GridTensor,
        steps: usize,
    ) -> RefineOutcome {
        let mut current = coords.to_vec();
        let (loss, rendered, mut grads) =
            renderer.loss_and_gradient(&current, types, radii, target);
        let mut best = RefineOutcome {
            coords: current.clone(),
            rendered,
            loss,
        };
        if current.is_empty() {
            return best;
        }

        let mut m = vec![Vector3::<f64>::zeros(); current.len()];
        let mut v = vec![Vector3::<f64>::zeros(); current.len()];

        for step in 1..=steps {
            for (i, grad) in grads.iter().enumerate() {
                for k in 0..3 {
                    let g = grad[k];
                    m[i][k] = ADAM_BETA1 * m[i][k] + (1.0 - ADAM_BETA1) * g;
                    v[i][k] = ADAM_BETA2 * v[i][k] + (1.0 - ADAM_BETA2) * g * g;
                    let m_hat: f64 = m[i][k] / (1.0 - ADAM_BETA1.powi(step as i32));
                    let v_hat: f64 = v[i][k] / (1.0 - ADAM_BETA2.powi(step as i32));
                    current[i].coords[k] -= self.learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
                }
            }

            let (loss, rendered, next_grads) =
                renderer.loss_and_gradient(&current, types, radii, target);
            trace!(step, loss, "refinement step");
            if loss < best.loss {
                best = RefineOutcome {
                    coords: current.clone(),
                    rendered,
                    loss,
                };
            }
            grads = next_grads;
        }

        best
    }
}
