//! Active configuration snapshot and the background reload daemon

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::DEFAULT_RELOAD_INTERVAL_MS;
use crate::utils::config::{self, ConfigLoadError, ConfigSnapshot};

/// Shared reference to the active configuration snapshot
///
/// Readers take an `Arc` to one snapshot and keep using it for the whole
/// computation; replacing the snapshot never affects readers already holding one.
#[derive(Debug)]
pub struct SnapshotHandle {
    active: RwLock<Arc<ConfigSnapshot>>,
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new(ConfigSnapshot::default())
    }
}

impl SnapshotHandle {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            active: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Load the initial snapshot from `path`, falling back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match config::load(path.as_ref()) {
            Ok(snapshot) => {
                info!(
                    path = %path.as_ref().display(),
                    anchors = snapshot.anchors.len(),
                    "Loaded configuration"
                );
                Self::new(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "Could not load configuration, using defaults");
                Self::default()
            }
        }
    }

    /// The snapshot in effect right now
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.active.read())
    }

    /// Atomically install `snapshot`, returning the one it replaced
    pub fn replace(&self, snapshot: ConfigSnapshot) -> Arc<ConfigSnapshot> {
        self.install(Arc::new(snapshot))
    }

    /// [`SnapshotHandle::replace`] for a snapshot the caller keeps a reference to
    pub fn install(&self, snapshot: Arc<ConfigSnapshot>) -> Arc<ConfigSnapshot> {
        std::mem::replace(&mut *self.active.write(), snapshot)
    }
}

/// Periodically re-reads the configuration file into a [`SnapshotHandle`]
pub struct ConfigReloader {
    handle: Arc<SnapshotHandle>,
    path: PathBuf,
    interval: Duration,
}

impl ConfigReloader {
    pub fn new(handle: Arc<SnapshotHandle>, path: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            path: path.into(),
            interval: Duration::from_millis(DEFAULT_RELOAD_INTERVAL_MS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload once
    ///
    /// On failure the active snapshot is left untouched and the error is logged.
    pub fn reload_once(&self) -> Result<(), ConfigLoadError> {
        match config::load(&self.path) {
            Ok(snapshot) => {
                debug!(
                    path = %self.path.display(),
                    anchors = snapshot.anchors.len(),
                    "Configuration reloaded"
                );
                self.handle.replace(snapshot);
                Ok(())
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Configuration reload failed, keeping previous snapshot"
                );
                Err(err)
            }
        }
    }

    /// Run until `shutdown` is cancelled, reloading every interval
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "Config reloader starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        // First tick completes immediately; the initial load happened at startup
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Config reloader shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let _ = self.reload_once();
                }
            }
        }
    }
}
