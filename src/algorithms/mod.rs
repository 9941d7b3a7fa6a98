//! Core positioning algorithms

pub mod distance;
pub mod solver;

pub use distance::{distance, DistanceModelParams};
pub use solver::{Observation, PositionSolver, SolverError, SolverOptions, SolverOutcome};
