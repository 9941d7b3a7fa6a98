//! RSSI Positioning Engine
//!
//! Estimates the planar position of mobile devices from RSSI reports relayed
//! by fixed anchor nodes, using a log-distance path-loss model and
//! Levenberg-Marquardt multilateration.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{AnchorNode, DeviceEstimate, SignalReading};
pub use crate::algorithms::{distance, DistanceModelParams, Observation, PositionSolver, SolverError, SolverOptions, SolverOutcome};
pub use crate::processing::{parse_report, AnchorReport, ParseError, SignalTable};
pub use crate::validation::{ConfigValidationError, PositioningError};
pub use crate::utils::{now_ms, ConfigDocument, ConfigLoadError, ConfigReloader, ConfigSnapshot, SnapshotHandle};
pub use crate::api::{ConfigStore, ConfigUpdateError, ConfigUpdateService, FileConfigStore, Identity, PositionEngine, PositionMap};
