pub mod artifact;
pub mod loader;
pub mod training;

pub use artifact::{Estimator, FeatureMatrix, ModelArtifact, StandardScaler};
pub use loader::{ArtifactLoader, ModelSlot, Trainer};
pub use training::{LogisticTrainer, TrainingError};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("failed to train model automatically: {0}")]
    TrainingFailed(String),

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),
}
