//! Query and configuration-update surfaces for the request layer

pub mod engine;
pub mod types;
pub mod update;

pub use engine::PositionEngine;
pub use types::{Identity, PositionMap};
pub use update::{ConfigStore, ConfigUpdateError, ConfigUpdateService, FileConfigStore};
