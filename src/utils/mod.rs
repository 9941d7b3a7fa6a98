//! Configuration, reload and logging utilities

pub mod config;
pub mod logging;
pub mod reload;

use std::time::{SystemTime, UNIX_EPOCH};

pub use config::{ConfigDocument, ConfigLoadError, ConfigSnapshot};
pub use reload::{ConfigReloader, SnapshotHandle};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
