//! Position queries over the signal table and the active configuration

use std::sync::Arc;

use tracing::{debug, warn};

use crate::algorithms::{distance, Observation, PositionSolver};
use crate::api::types::PositionMap;
use crate::core::{DeviceEstimate, DEFAULT_MAX_READING_AGE_MS, MIN_OBSERVATIONS};
use crate::processing::{AnchorReport, ParseError, SignalTable};
use crate::utils::config::ConfigSnapshot;
use crate::utils::reload::SnapshotHandle;
use crate::validation::PositioningError;

/// Joins fresh readings with the active anchor layout and fits positions
pub struct PositionEngine {
    table: Arc<SignalTable>,
    config: Arc<SnapshotHandle>,
    max_reading_age_ms: u64,
    require_convergence: bool,
    retention_ms: Option<u64>,
}

impl PositionEngine {
    pub fn new(table: Arc<SignalTable>, config: Arc<SnapshotHandle>) -> Self {
        Self {
            table,
            config,
            max_reading_age_ms: DEFAULT_MAX_READING_AGE_MS,
            require_convergence: false,
            retention_ms: None,
        }
    }

    /// Maximum reading age still used for a fix
    pub fn with_max_reading_age(mut self, max_age_ms: u64) -> Self {
        self.max_reading_age_ms = max_age_ms;
        self
    }

    /// Omit devices whose fit ran out of iterations instead of converging
    pub fn with_require_convergence(mut self, require: bool) -> Self {
        self.require_convergence = require;
        self
    }

    /// Horizon for [`PositionEngine::sweep_inactive`]; `None` keeps every device
    pub fn with_retention(mut self, retention_ms: Option<u64>) -> Self {
        self.retention_ms = retention_ms;
        self
    }

    pub fn table(&self) -> &Arc<SignalTable> {
        &self.table
    }

    pub fn config(&self) -> &Arc<SnapshotHandle> {
        &self.config
    }

    /// Parse and record a textual anchor report received at `now_ms`
    pub fn ingest_text(&self, text: &str, now_ms: u64) -> Result<AnchorReport, ParseError> {
        let report = self.table.ingest_text(text, now_ms)?;
        if let Ok(range) = self.config.current().distance_model.distance(report.rssi) {
            debug!(
                anchor = %report.anchor_id,
                device = %report.device_mac,
                rssi = report.rssi,
                distance_m = range,
                "Estimated range"
            );
        }
        Ok(report)
    }

    /// Positions of every device with enough fresh observations
    ///
    /// Devices that cannot be resolved are left out; this never fails.
    pub fn compute_all(&self, now_ms: u64) -> PositionMap {
        let snapshot = self.config.current();
        let mut positions = PositionMap::new();

        if let Err(err) = snapshot.validate_model() {
            warn!(error = %err, "Active configuration cannot produce positions");
            return positions;
        }

        for device_id in self.table.device_ids() {
            match self.estimate_with(&snapshot, &device_id, now_ms) {
                Ok(estimate) => {
                    positions.insert(device_id, estimate);
                }
                Err(err) => {
                    debug!(device = %device_id, error = %err, "Device omitted from positions");
                }
            }
        }

        positions
    }

    /// Position of one device, with the reason when none can be produced
    pub fn estimate_device(
        &self,
        device_id: &str,
        now_ms: u64,
    ) -> Result<DeviceEstimate, PositioningError> {
        let snapshot = self.config.current();
        self.estimate_with(&snapshot, device_id, now_ms)
    }

    /// [`PositionEngine::compute_all`] serialized as `{"<mac>": {"x": .., "y": ..}}`
    pub fn positions_json(&self, now_ms: u64) -> serde_json::Result<String> {
        serde_json::to_string(&self.compute_all(now_ms))
    }

    /// Drop devices silent for longer than the retention horizon, if one is set
    pub fn sweep_inactive(&self, now_ms: u64) -> usize {
        match self.retention_ms {
            Some(horizon) => self.table.sweep_inactive(now_ms, horizon),
            None => 0,
        }
    }

    fn estimate_with(
        &self,
        snapshot: &ConfigSnapshot,
        device_id: &str,
        now_ms: u64,
    ) -> Result<DeviceEstimate, PositioningError> {
        if !self.table.contains_device(device_id) {
            return Err(PositioningError::UnknownDevice {
                device_id: device_id.to_string(),
            });
        }

        let model = &snapshot.distance_model;
        snapshot.validate_model()?;

        let observations: Vec<Observation> = self
            .table
            .fresh_readings_for(device_id, now_ms, self.max_reading_age_ms)
            .iter()
            .filter_map(|reading| {
                let anchor = snapshot.anchor(&reading.anchor_id)?;
                let range = distance(reading.rssi, model.ref_power, model.path_loss_exponent);
                let usable = range.is_finite() && anchor.x.is_finite() && anchor.y.is_finite();
                usable.then(|| Observation::new(anchor.x, anchor.y, range))
            })
            .collect();

        if observations.len() < MIN_OBSERVATIONS {
            return Err(PositioningError::InsufficientObservations {
                device_id: device_id.to_string(),
                available: observations.len(),
                required: MIN_OBSERVATIONS,
            });
        }

        let outcome = PositionSolver::new(snapshot.solver_options).solve(&observations)?;
        if !outcome.converged {
            if self.require_convergence {
                return Err(PositioningError::NotConverged {
                    device_id: device_id.to_string(),
                    iterations: outcome.iterations,
                });
            }
            debug!(
                device = %device_id,
                iterations = outcome.iterations,
                "Reporting position from a fit that did not converge"
            );
        }

        Ok(DeviceEstimate {
            device_id: device_id.to_string(),
            x: outcome.x,
            y: outcome.y,
            converged: outcome.converged,
            iterations: outcome.iterations,
            anchor_count: observations.len(),
        })
    }
}
