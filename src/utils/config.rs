use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::warn;

use crate::algorithms::{DistanceModelParams, SolverOptions};
use crate::core::AnchorNode;
use crate::validation::ConfigValidationError;

/// Configuration document as stored on disk and exchanged with the request layer
///
/// Every field is optional. Unknown top-level keys are kept so that a document
/// written back out is not stripped of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "espPositions", default, skip_serializing_if = "Option::is_none")]
    pub esp_positions: Option<BTreeMap<String, AnchorPosition>>,

    #[serde(rename = "distanceCalculation", default, skip_serializing_if = "Option::is_none")]
    pub distance_calculation: Option<DistanceCalculation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trilateration: Option<TrilaterationSection>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Anchor coordinates in the installation's planar frame (metres)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceCalculation {
    #[serde(rename = "txPower", default, skip_serializing_if = "Option::is_none")]
    pub tx_power: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrilaterationSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_options: Option<LmOptions>,
}

/// Levenberg-Marquardt options as named in the config document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LmOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damping: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_values: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_difference: Option<f64>,
    /// Any JSON number; integral values such as `100.0` are accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_tolerance: Option<f64>,
}

/// Failure to read or decode a configuration document
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable, fully-resolved configuration used for one computation
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub anchors: HashMap<String, AnchorNode>,
    pub distance_model: DistanceModelParams,
    pub solver_options: SolverOptions,
    invalid_max_iterations: Option<f64>,
    extra: Map<String, Value>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::from_document(&ConfigDocument::default())
    }
}

impl ConfigSnapshot {
    /// Resolve a document, filling absent fields from defaults
    ///
    /// No validation is done; a non-positive path-loss exponent is carried
    /// through and rejected when positions are computed.
    pub fn from_document(doc: &ConfigDocument) -> Self {
        let anchors = doc
            .esp_positions
            .iter()
            .flatten()
            .map(|(id, pos)| {
                let node = AnchorNode {
                    id: id.clone(),
                    x: pos.x,
                    y: pos.y,
                };
                (id.clone(), node)
            })
            .collect();

        let defaults = DistanceModelParams::default();
        let calc = doc.distance_calculation.clone().unwrap_or_default();
        let distance_model = DistanceModelParams {
            ref_power: calc.tx_power.unwrap_or(defaults.ref_power),
            path_loss_exponent: calc.n_factor.unwrap_or(defaults.path_loss_exponent),
        };

        let defaults = SolverOptions::default();
        let lm = doc
            .trilateration
            .as_ref()
            .and_then(|t| t.lm_options.clone())
            .unwrap_or_default();
        let (max_iterations, invalid_max_iterations) = match &lm.max_iterations {
            Some(number) => match iteration_count(number) {
                Some(count) => (Some(count), None),
                None => (None, Some(number.as_f64().unwrap_or(f64::NAN))),
            },
            None => (None, None),
        };
        let solver_options = SolverOptions {
            damping: lm.damping.unwrap_or(defaults.damping),
            initial_guess: lm
                .initial_values
                .map(|[x, y]| (x, y))
                .unwrap_or(defaults.initial_guess),
            gradient_step: lm.gradient_difference.unwrap_or(defaults.gradient_step),
            max_iterations: max_iterations.unwrap_or(defaults.max_iterations),
            error_tolerance: lm.error_tolerance.unwrap_or(defaults.error_tolerance),
        };

        Self {
            anchors,
            distance_model,
            solver_options,
            invalid_max_iterations,
            extra: doc.extra.clone(),
        }
    }

    /// Resolve and validate a document
    pub fn try_from_document(doc: &ConfigDocument) -> Result<Self, ConfigValidationError> {
        let snapshot = Self::from_document(doc);
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check every value that feeds the distance model and solver
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let mut ids: Vec<&String> = self.anchors.keys().collect();
        ids.sort();
        for id in ids {
            let anchor = &self.anchors[id];
            if !anchor.x.is_finite() || !anchor.y.is_finite() {
                return Err(ConfigValidationError::InvalidAnchor {
                    anchor_id: anchor.id.clone(),
                    x: anchor.x,
                    y: anchor.y,
                });
            }
        }
        self.validate_model()
    }

    /// Check the distance model and solver options, ignoring anchors
    pub fn validate_model(&self) -> Result<(), ConfigValidationError> {
        if let Some(value) = self.invalid_max_iterations {
            return Err(ConfigValidationError::InvalidIterationCount { value });
        }
        self.distance_model.validate()?;
        self.solver_options.validate()
    }

    pub fn anchor(&self, anchor_id: &str) -> Option<&AnchorNode> {
        self.anchors.get(anchor_id)
    }

    /// Full document for this snapshot, defaults included
    pub fn to_document(&self) -> ConfigDocument {
        let esp_positions = self
            .anchors
            .values()
            .map(|a| (a.id.clone(), AnchorPosition { x: a.x, y: a.y }))
            .collect();

        let opts = &self.solver_options;
        ConfigDocument {
            esp_positions: Some(esp_positions),
            distance_calculation: Some(DistanceCalculation {
                tx_power: Some(self.distance_model.ref_power),
                n_factor: Some(self.distance_model.path_loss_exponent),
            }),
            trilateration: Some(TrilaterationSection {
                lm_options: Some(LmOptions {
                    damping: Some(opts.damping),
                    initial_values: Some([opts.initial_guess.0, opts.initial_guess.1]),
                    gradient_difference: Some(opts.gradient_step),
                    max_iterations: Some(Number::from(opts.max_iterations as u64)),
                    error_tolerance: Some(opts.error_tolerance),
                }),
            }),
            extra: self.extra.clone(),
        }
    }
}

/// Non-negative integral value of `number`, if it has one
fn iteration_count(number: &Number) -> Option<usize> {
    if let Some(count) = number.as_u64() {
        return usize::try_from(count).ok();
    }
    let value = number.as_f64()?;
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as usize)
    } else {
        None
    }
}

/// Decode a configuration document from JSON text
pub fn parse_document(content: &str) -> Result<ConfigDocument, ConfigLoadError> {
    Ok(serde_json::from_str(content)?)
}

/// Read and decode the configuration document at `path`
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<ConfigDocument, ConfigLoadError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&content)
}

/// Load a snapshot from the JSON document at `path`
///
/// A snapshot that fails validation is still returned; the problem is logged
/// and affected readings are excluded at query time.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ConfigSnapshot, ConfigLoadError> {
    let doc = read_document(path.as_ref())?;
    let snapshot = ConfigSnapshot::from_document(&doc);
    if let Err(err) = snapshot.validate() {
        warn!(
            path = %path.as_ref().display(),
            error = %err,
            "Loaded configuration will not yield positions"
        );
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_DOCUMENT: &str = r#"{
        "espPositions": {
            "A1": { "x": 0, "y": 0 },
            "A2": { "x": 10, "y": 0 },
            "A3": { "x": 5.5, "y": 10 }
        },
        "distanceCalculation": { "txPower": -55, "n_factor": 2.4 },
        "trilateration": {
            "lm_options": {
                "damping": 0.5,
                "initialValues": [1, 2],
                "gradientDifference": 0.0001,
                "maxIterations": 40,
                "errorTolerance": 0.01
            }
        },
        "floorPlan": "level-2.png"
    }"#;

    #[test]
    fn test_defaults_for_empty_document() {
        let snapshot = ConfigSnapshot::from_document(&parse_document("{}").unwrap());
        assert!(snapshot.anchors.is_empty());
        assert_eq!(snapshot.distance_model.ref_power, -49.0);
        assert_eq!(snapshot.distance_model.path_loss_exponent, 3.1);
        assert_eq!(snapshot.solver_options.damping, 0.02);
        assert_eq!(snapshot.solver_options.initial_guess, (5.0, 5.0));
        assert_eq!(snapshot.solver_options.gradient_step, 1e-6);
        assert_eq!(snapshot.solver_options.max_iterations, 100);
        assert_eq!(snapshot.solver_options.error_tolerance, 1e-3);
    }

    #[test]
    fn test_full_document() {
        let snapshot = ConfigSnapshot::from_document(&parse_document(FULL_DOCUMENT).unwrap());
        assert_eq!(snapshot.anchors.len(), 3);
        assert_eq!(snapshot.anchor("A3").map(|a| (a.x, a.y)), Some((5.5, 10.0)));
        assert_eq!(snapshot.distance_model, DistanceModelParams::new(-55.0, 2.4));
        assert_eq!(snapshot.solver_options.damping, 0.5);
        assert_eq!(snapshot.solver_options.initial_guess, (1.0, 2.0));
        assert_eq!(snapshot.solver_options.max_iterations, 40);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let doc = parse_document(
            r#"{ "distanceCalculation": { "n_factor": 2.0 }, "trilateration": { "lm_options": { "maxIterations": 10 } } }"#,
        )
        .unwrap();
        let snapshot = ConfigSnapshot::from_document(&doc);
        assert_eq!(snapshot.distance_model.ref_power, -49.0);
        assert_eq!(snapshot.distance_model.path_loss_exponent, 2.0);
        assert_eq!(snapshot.solver_options.max_iterations, 10);
        assert_eq!(snapshot.solver_options.damping, 0.02);
    }

    #[test]
    fn test_float_iteration_count() {
        for body in [
            r#"{ "trilateration": { "lm_options": { "maxIterations": 100.0 } } }"#,
            r#"{ "trilateration": { "lm_options": { "maxIterations": 1e2 } } }"#,
        ] {
            let snapshot = ConfigSnapshot::try_from_document(&parse_document(body).unwrap()).unwrap();
            assert_eq!(snapshot.solver_options.max_iterations, 100);
        }

        for body in [
            r#"{ "trilateration": { "lm_options": { "maxIterations": 2.5 } } }"#,
            r#"{ "trilateration": { "lm_options": { "maxIterations": -3 } } }"#,
        ] {
            let doc = parse_document(body).unwrap();
            assert!(matches!(
                ConfigSnapshot::try_from_document(&doc),
                Err(ConfigValidationError::InvalidIterationCount { .. })
            ));
        }
    }

    #[test]
    fn test_to_document_round_trip() {
        let snapshot = ConfigSnapshot::from_document(&parse_document(FULL_DOCUMENT).unwrap());
        let doc = snapshot.to_document();
        assert_eq!(doc.extra.get("floorPlan"), Some(&Value::from("level-2.png")));

        let json = serde_json::to_string(&doc).unwrap();
        let reparsed = ConfigSnapshot::from_document(&parse_document(&json).unwrap());
        assert_eq!(reparsed, snapshot);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let doc = parse_document(r#"{ "distanceCalculation": { "n_factor": 0 } }"#).unwrap();
        assert!(matches!(
            ConfigSnapshot::try_from_document(&doc),
            Err(ConfigValidationError::NonPositivePathLoss { .. })
        ));

        let doc = parse_document(r#"{ "trilateration": { "lm_options": { "damping": -1 } } }"#).unwrap();
        assert!(ConfigSnapshot::try_from_document(&doc).is_err());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse_document("{ not json"), Err(ConfigLoadError::Json(_))));
        assert!(matches!(
            parse_document(r#"{ "espPositions": { "A1": { "x": "left" } } }"#),
            Err(ConfigLoadError::Json(_))
        ));
        assert!(matches!(
            parse_document(r#"{ "espPositions": [1, 2] }"#),
            Err(ConfigLoadError::Json(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL_DOCUMENT.as_bytes()).unwrap();

        let snapshot = load(file.path()).unwrap();
        assert_eq!(snapshot.anchors.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigLoadError::Io { .. })));
    }

    #[test]
    fn test_load_keeps_invalid_model() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{ "distanceCalculation": { "n_factor": -1 } }"#).unwrap();

        let snapshot = load(file.path()).unwrap();
        assert_eq!(snapshot.distance_model.path_loss_exponent, -1.0);
        assert!(snapshot.validate().is_err());
    }
}
