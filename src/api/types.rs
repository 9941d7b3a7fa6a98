//! Common API types

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::DeviceEstimate;

/// Query result keyed by device MAC
pub type PositionMap = BTreeMap<String, DeviceEstimate>;

/// Caller identity already verified by the request layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}
