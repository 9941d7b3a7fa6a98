//! Core data types for the positioning engine

use serde::{Deserialize, Serialize};

/// Fixed anchor node with known planar coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Latest RSSI observation of a device by one anchor
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReading {
    pub device_id: String,
    pub anchor_id: String,
    pub rssi: i32,
    pub received_at_ms: u64,
}

impl SignalReading {
    /// Age of the reading at `now_ms`; readings stamped after `now_ms` have age 0
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.received_at_ms)
    }
}

/// Estimated device position produced by a query
///
/// Only `x` and `y` are part of the serialized query output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEstimate {
    #[serde(skip)]
    pub device_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(skip)]
    pub converged: bool,
    #[serde(skip)]
    pub iterations: usize,
    #[serde(skip)]
    pub anchor_count: usize,
}
