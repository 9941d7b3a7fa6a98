//! Damped Gauss-Newton (Levenberg-Marquardt) fit of a planar position to
//! anchor range observations

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::core::{
    DEFAULT_DAMPING, DEFAULT_ERROR_TOLERANCE, DEFAULT_GRADIENT_STEP, DEFAULT_INITIAL_GUESS,
    DEFAULT_MAX_ITERATIONS, MIN_OBSERVATIONS,
};
use crate::validation::ConfigValidationError;

/// Relative determinant below which the damped normal matrix is treated as singular
const SINGULAR_THRESHOLD: f64 = 1e-12;

/// Range from one anchor to the unknown device position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
    pub distance: f64,
}

impl Observation {
    pub fn new(x: f64, y: f64, distance: f64) -> Self {
        Self { x, y, distance }
    }

    /// Predicted range from `(px, py)` minus the measured range
    fn residual(&self, px: f64, py: f64) -> f64 {
        (px - self.x).hypot(py - self.y) - self.distance
    }
}

/// Tuning of the iterative fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolverOptions {
    /// Added to the diagonal of the normal matrix
    pub damping: f64,
    /// Starting estimate
    pub initial_guess: (f64, f64),
    /// Step for the forward finite-difference Jacobian
    pub gradient_step: f64,
    pub max_iterations: usize,
    /// Convergence threshold on the norm of the parameter update
    pub error_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            initial_guess: DEFAULT_INITIAL_GUESS,
            gradient_step: DEFAULT_GRADIENT_STEP,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            error_tolerance: DEFAULT_ERROR_TOLERANCE,
        }
    }
}

impl SolverOptions {
    /// Reject options that would make the iteration produce non-numeric results
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let finite = [
            ("damping", self.damping),
            ("initialValues[0]", self.initial_guess.0),
            ("initialValues[1]", self.initial_guess.1),
            ("gradientDifference", self.gradient_step),
            ("errorTolerance", self.error_tolerance),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(ConfigValidationError::NonFinite { field, value });
            }
        }
        if self.damping < 0.0 {
            return Err(ConfigValidationError::NegativeDamping {
                value: self.damping,
            });
        }
        if self.gradient_step <= 0.0 {
            return Err(ConfigValidationError::NonPositive {
                field: "gradientDifference",
                value: self.gradient_step,
            });
        }
        if self.error_tolerance <= 0.0 {
            return Err(ConfigValidationError::NonPositive {
                field: "errorTolerance",
                value: self.error_tolerance,
            });
        }
        Ok(())
    }
}

/// Errors that prevent the fit from producing an estimate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("insufficient data: {available} observations, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("normal equations are singular")]
    Singular,

    #[error("estimate became non-finite at iteration {iteration}")]
    Diverged { iteration: usize },
}

/// Result of a fit
///
/// The estimate is the last iterate whether or not `converged` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOutcome {
    pub x: f64,
    pub y: f64,
    pub converged: bool,
    pub iterations: usize,
    /// Sum of squared residuals at the returned estimate
    pub cost: f64,
}

/// Levenberg-Marquardt solver with fixed damping
#[derive(Debug, Clone, Default)]
pub struct PositionSolver {
    options: SolverOptions,
}

impl PositionSolver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Fit a position to at least three observations
    pub fn solve(&self, observations: &[Observation]) -> Result<SolverOutcome, SolverError> {
        if observations.len() < MIN_OBSERVATIONS {
            return Err(SolverError::InsufficientData {
                available: observations.len(),
                required: MIN_OBSERVATIONS,
            });
        }

        let opts = &self.options;
        let mut estimate = Vector2::new(opts.initial_guess.0, opts.initial_guess.1);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < opts.max_iterations {
            let (residuals, jacobian) = self.residuals_and_jacobian(observations, &estimate);

            let jt = jacobian.transpose();
            let jt_j = &jt * &jacobian;
            let jt_r = &jt * &residuals;

            let normal = Matrix2::new(
                jt_j[(0, 0)] + opts.damping,
                jt_j[(0, 1)],
                jt_j[(1, 0)],
                jt_j[(1, 1)] + opts.damping,
            );
            let gradient = Vector2::new(jt_r[0], jt_r[1]);

            let step = solve_normal_equations(&normal, &gradient)?;
            estimate += step;
            iterations += 1;

            if !estimate.x.is_finite() || !estimate.y.is_finite() {
                return Err(SolverError::Diverged {
                    iteration: iterations,
                });
            }

            if step.norm() < opts.error_tolerance {
                converged = true;
                break;
            }
        }

        let cost: f64 = observations
            .iter()
            .map(|o| o.residual(estimate.x, estimate.y).powi(2))
            .sum();

        trace!(
            x = estimate.x,
            y = estimate.y,
            iterations,
            converged,
            cost,
            "Trilateration fit finished"
        );

        Ok(SolverOutcome {
            x: estimate.x,
            y: estimate.y,
            converged,
            iterations,
            cost,
        })
    }

    /// Residuals at `estimate` and their forward-difference Jacobian
    fn residuals_and_jacobian(
        &self,
        observations: &[Observation],
        estimate: &Vector2<f64>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let h = self.options.gradient_step;
        let n = observations.len();
        let mut residuals = DVector::zeros(n);
        let mut jacobian = DMatrix::zeros(n, 2);

        for (i, obs) in observations.iter().enumerate() {
            let r = obs.residual(estimate.x, estimate.y);
            residuals[i] = r;
            jacobian[(i, 0)] = (obs.residual(estimate.x + h, estimate.y) - r) / h;
            jacobian[(i, 1)] = (obs.residual(estimate.x, estimate.y + h) - r) / h;
        }

        (residuals, jacobian)
    }
}

/// Solve `normal * step = -gradient`
fn solve_normal_equations(
    normal: &Matrix2<f64>,
    gradient: &Vector2<f64>,
) -> Result<Vector2<f64>, SolverError> {
    let det = normal.determinant();
    let scale = (normal[(0, 0)] * normal[(1, 1)]).abs();
    if !det.is_finite() || det.abs() <= SINGULAR_THRESHOLD * scale {
        return Err(SolverError::Singular);
    }

    let step = normal.lu().solve(&(-gradient)).ok_or(SolverError::Singular)?;
    if !step.x.is_finite() || !step.y.is_finite() {
        return Err(SolverError::Singular);
    }
    Ok(step)
}
