//! Validation and error classification

pub mod error;

pub use error::{ConfigValidationError, PositioningError};
