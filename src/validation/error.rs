//! Error classification for configuration validation and per-device positioning

use thiserror::Error;

use crate::algorithms::solver::SolverError;

/// A configuration value that would make the distance model or solver
/// produce non-numeric results
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("path-loss exponent must be positive, got {value}")]
    NonPositivePathLoss { value: f64 },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("damping must not be negative, got {value}")]
    NegativeDamping { value: f64 },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("maxIterations must be a non-negative integer, got {value}")]
    InvalidIterationCount { value: f64 },

    #[error("anchor '{anchor_id}' has non-finite coordinates ({x}, {y})")]
    InvalidAnchor { anchor_id: String, x: f64, y: f64 },
}

/// Reason a single device could not be positioned
///
/// These never reach the query caller; `compute_all` logs them and omits the device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositioningError {
    #[error("device '{device_id}' has no readings")]
    UnknownDevice { device_id: String },

    #[error("device '{device_id}' has {available} usable observations, {required} required")]
    InsufficientObservations {
        device_id: String,
        available: usize,
        required: usize,
    },

    #[error("configuration rejected: {0}")]
    InvalidModel(#[from] ConfigValidationError),

    #[error("solver failed: {0}")]
    Solver(#[from] SolverError),

    #[error("device '{device_id}' did not converge after {iterations} iterations")]
    NotConverged { device_id: String, iterations: usize },
}
