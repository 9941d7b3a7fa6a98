//! Validated replacement of the active configuration

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::api::types::Identity;
use crate::utils::config::{ConfigDocument, ConfigSnapshot};
use crate::utils::reload::SnapshotHandle;
use crate::validation::ConfigValidationError;

/// Durable storage for configuration documents
pub trait ConfigStore: Send + Sync {
    fn persist(&self, doc: &ConfigDocument) -> io::Result<()>;
}

/// Stores the document as pretty-printed JSON at a fixed path
///
/// The file is written beside the target and renamed into place, so the reload
/// daemon never reads a half-written document.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn persist(&self, doc: &ConfigDocument) -> io::Result<()> {
        let content = serde_json::to_string_pretty(doc).map_err(io::Error::other)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.path)
    }
}

#[derive(Debug, Error)]
pub enum ConfigUpdateError {
    #[error("malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("configuration rejected: {0}")]
    Invalid(#[from] ConfigValidationError),

    #[error("failed to persist configuration: {0}")]
    Persist(#[source] io::Error),
}

/// Accepts full replacement documents from an authenticated caller
pub struct ConfigUpdateService {
    handle: Arc<SnapshotHandle>,
    store: Box<dyn ConfigStore>,
}

impl ConfigUpdateService {
    pub fn new(handle: Arc<SnapshotHandle>, store: Box<dyn ConfigStore>) -> Self {
        Self { handle, store }
    }

    /// The active configuration as a full document
    pub fn current_document(&self) -> ConfigDocument {
        self.handle.current().to_document()
    }

    /// Validate, persist and adopt `doc`
    ///
    /// The active snapshot changes only if both validation and persistence succeed.
    pub fn apply(
        &self,
        identity: &Identity,
        doc: ConfigDocument,
    ) -> Result<Arc<ConfigSnapshot>, ConfigUpdateError> {
        info!(user = %identity.username, "Configuration update requested");

        let snapshot = ConfigSnapshot::try_from_document(&doc).map_err(|err| {
            warn!(user = %identity.username, error = %err, "Rejected configuration update");
            err
        })?;

        self.store.persist(&doc).map_err(|err| {
            warn!(error = %err, "Could not persist configuration update");
            ConfigUpdateError::Persist(err)
        })?;

        let snapshot = Arc::new(snapshot);
        self.handle.install(Arc::clone(&snapshot));
        info!(
            user = %identity.username,
            anchors = snapshot.anchors.len(),
            "Configuration updated"
        );
        Ok(snapshot)
    }

    /// [`ConfigUpdateService::apply`] for a raw JSON request body
    pub fn apply_json(
        &self,
        identity: &Identity,
        body: &str,
    ) -> Result<Arc<ConfigSnapshot>, ConfigUpdateError> {
        let doc: ConfigDocument = serde_json::from_str(body)?;
        self.apply(identity, doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryStore {
        saved: Arc<Mutex<Vec<ConfigDocument>>>,
    }

    impl ConfigStore for MemoryStore {
        fn persist(&self, doc: &ConfigDocument) -> io::Result<()> {
            self.saved.lock().push(doc.clone());
            Ok(())
        }
    }

    struct BrokenStore;

    impl ConfigStore for BrokenStore {
        fn persist(&self, _doc: &ConfigDocument) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    fn admin() -> Identity {
        Identity::new("admin")
    }

    const UPDATE: &str = r#"{
        "espPositions": { "A1": { "x": 0, "y": 0 }, "A2": { "x": 8, "y": 0 }, "A3": { "x": 4, "y": 6 } },
        "distanceCalculation": { "txPower": -52, "n_factor": 2.8 }
    }"#;

    #[test]
    fn test_apply_persists_and_swaps() {
        let handle = Arc::new(SnapshotHandle::default());
        let store = MemoryStore::default();
        let saved = Arc::clone(&store.saved);
        let service = ConfigUpdateService::new(Arc::clone(&handle), Box::new(store));

        let snapshot = service.apply_json(&admin(), UPDATE).unwrap();
        assert_eq!(snapshot.anchors.len(), 3);
        assert!(Arc::ptr_eq(&snapshot, &handle.current()));
        assert_eq!(handle.current().distance_model.ref_power, -52.0);
        assert_eq!(saved.lock().len(), 1);
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let handle = Arc::new(SnapshotHandle::default());
        let store = MemoryStore::default();
        let saved = Arc::clone(&store.saved);
        let service = ConfigUpdateService::new(Arc::clone(&handle), Box::new(store));

        let result = service.apply_json(&admin(), r#"{ "distanceCalculation": { "n_factor": -3 } }"#);
        assert!(matches!(result, Err(ConfigUpdateError::Invalid(_))));
        assert!(saved.lock().is_empty());
        assert_eq!(*handle.current(), ConfigSnapshot::default());

        let result = service.apply_json(&admin(), r#"{ "espPositions": 5 }"#);
        assert!(matches!(result, Err(ConfigUpdateError::Malformed(_))));
    }

    #[test]
    fn test_iteration_count_as_float() {
        let handle = Arc::new(SnapshotHandle::default());
        let service = ConfigUpdateService::new(Arc::clone(&handle), Box::new(MemoryStore::default()));

        let body = r#"{ "trilateration": { "lm_options": { "maxIterations": 100.0 } } }"#;
        let snapshot = service.apply_json(&admin(), body).unwrap();
        assert_eq!(snapshot.solver_options.max_iterations, 100);

        let body = r#"{ "trilateration": { "lm_options": { "maxIterations": 2.5 } } }"#;
        assert!(matches!(
            service.apply_json(&admin(), body),
            Err(ConfigUpdateError::Invalid(ConfigValidationError::InvalidIterationCount { .. }))
        ));
    }

    #[test]
    fn test_persist_failure_keeps_snapshot() {
        let handle = Arc::new(SnapshotHandle::default());
        let service = ConfigUpdateService::new(Arc::clone(&handle), Box::new(BrokenStore));

        let result = service.apply_json(&admin(), UPDATE);
        assert!(matches!(result, Err(ConfigUpdateError::Persist(_))));
        assert!(handle.current().anchors.is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let handle = Arc::new(SnapshotHandle::default());
        let service =
            ConfigUpdateService::new(Arc::clone(&handle), Box::new(FileConfigStore::new(&path)));

        service.apply_json(&admin(), UPDATE).unwrap();

        let reloaded = config::load(&path).unwrap();
        assert_eq!(reloaded, *handle.current());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_current_document_reports_defaults() {
        let service = ConfigUpdateService::new(
            Arc::new(SnapshotHandle::default()),
            Box::new(MemoryStore::default()),
        );

        let doc = service.current_document();
        let lm = doc.trilateration.and_then(|t| t.lm_options).unwrap();
        assert_eq!(lm.max_iterations.and_then(|n| n.as_u64()), Some(100));
        assert_eq!(lm.initial_values, Some([5.0, 5.0]));
        assert_eq!(doc.distance_calculation.and_then(|d| d.n_factor), Some(3.1));
    }
}
