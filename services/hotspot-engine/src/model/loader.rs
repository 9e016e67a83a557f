use super::artifact::ModelArtifact;
use super::ModelError;
use crate::metrics;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Produces the artifact file at `artifact_path` as a side effect.
pub trait Trainer: Send + Sync {
    fn train(&self, artifact_path: &Path) -> Result<(), String>;
}

/// Resolves the artifact on disk, training it first when it is missing.
pub struct ArtifactLoader {
    artifact_path: PathBuf,
    trainer: Option<Arc<dyn Trainer>>,
}

impl ArtifactLoader {
    pub fn new(artifact_path: impl Into<PathBuf>, trainer: Option<Arc<dyn Trainer>>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            trainer,
        }
    }

    pub fn load(&self) -> Result<ModelArtifact, ModelError> {
        if !self.artifact_path.exists() {
            if let Some(trainer) = &self.trainer {
                warn!(
                    "Model file {} missing, training a new one",
                    self.artifact_path.display()
                );
                trainer
                    .train(&self.artifact_path)
                    .map_err(ModelError::TrainingFailed)?;
            }
        }

        let bytes = match fs::read(&self.artifact_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ModelError::ArtifactNotFound(self.artifact_path.clone()))
            }
            Err(e) => {
                return Err(ModelError::InvalidArtifact(format!(
                    "failed to read {}: {}",
                    self.artifact_path.display(),
                    e
                )))
            }
        };

        ModelArtifact::decode(&bytes)
    }
}

/// Holds the process-wide model. Empty until a load succeeds.
pub struct ModelSlot {
    loader: ArtifactLoader,
    current: RwLock<Option<Arc<ModelArtifact>>>,
    load_lock: Mutex<()>,
}

impl ModelSlot {
    pub fn new(loader: ArtifactLoader) -> Self {
        Self {
            loader,
            current: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    /// Eager startup load. A failure is logged and leaves the slot empty.
    pub fn initialize(&self) -> bool {
        match self.get_or_load() {
            Ok(artifact) => {
                info!(
                    model = artifact.model().kind(),
                    scaler = artifact.scaler().is_some(),
                    "Loaded model"
                );
                true
            }
            Err(e) => {
                error!("Model failed to load at startup: {}", e);
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.current.read().clone()
    }

    /// Returns the loaded model, invoking the loader if none is held.
    ///
    /// Blocking: may read from disk and train. Loads are serialized so that
    /// concurrent callers do not train twice.
    pub fn get_or_load(&self) -> Result<Arc<ModelArtifact>, ModelError> {
        if let Some(artifact) = self.current() {
            return Ok(artifact);
        }

        let _guard = self.load_lock.lock();
        if let Some(artifact) = self.current() {
            return Ok(artifact);
        }

        match self.loader.load() {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                *self.current.write() = Some(artifact.clone());
                metrics::MODEL_LOADS.with_label_values(&["success"]).inc();
                Ok(artifact)
            }
            Err(e) => {
                metrics::MODEL_LOADS.with_label_values(&["failure"]).inc();
                Err(e)
            }
        }
    }
}
