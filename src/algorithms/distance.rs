//! Log-distance path-loss model mapping RSSI to range

use serde::Serialize;

use crate::core::{DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REF_POWER};
use crate::validation::ConfigValidationError;

/// Estimated distance in metres for `rssi` given the 1 m reference power and
/// path-loss exponent `n`
///
/// `10 ^ ((ref_power - rssi) / (10 n))`. Callers must ensure `n > 0`; see
/// [`DistanceModelParams::distance`] for the checked form.
pub fn distance(rssi: i32, ref_power: f64, n: f64) -> f64 {
    10f64.powf((ref_power - rssi as f64) / (10.0 * n))
}

/// Parameters of the path-loss model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceModelParams {
    /// Received power at 1 m (dBm)
    pub ref_power: f64,
    /// Path-loss exponent
    pub path_loss_exponent: f64,
}

impl Default for DistanceModelParams {
    fn default() -> Self {
        Self {
            ref_power: DEFAULT_REF_POWER,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

impl DistanceModelParams {
    pub fn new(ref_power: f64, path_loss_exponent: f64) -> Self {
        Self {
            ref_power,
            path_loss_exponent,
        }
    }

    /// Check that the model yields finite, monotone distances
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.ref_power.is_finite() {
            return Err(ConfigValidationError::NonFinite {
                field: "txPower",
                value: self.ref_power,
            });
        }
        if !self.path_loss_exponent.is_finite() {
            return Err(ConfigValidationError::NonFinite {
                field: "n_factor",
                value: self.path_loss_exponent,
            });
        }
        if self.path_loss_exponent <= 0.0 {
            return Err(ConfigValidationError::NonPositivePathLoss {
                value: self.path_loss_exponent,
            });
        }
        Ok(())
    }

    /// Distance for `rssi`, rejecting parameters that would give inf/NaN
    pub fn distance(&self, rssi: i32) -> Result<f64, ConfigValidationError> {
        self.validate()?;
        Ok(distance(rssi, self.ref_power, self.path_loss_exponent))
    }
}
