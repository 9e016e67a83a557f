use crate::cache::PredictionCache;
use crate::dataset::{Dataset, LAT_COLUMN, LONG_COLUMN};
use crate::errors::ApiError;
use crate::metrics;
use crate::model::{FeatureMatrix, ModelArtifact, ModelSlot};
use crate::models::PredictionRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq)]
pub enum ScoringError {
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("prediction failed: {0}")]
    PredictionFailed(String),
}

/// Scores every row of `dataset` with `artifact`, preserving row order.
///
/// Either every row is scored or an error is returned; there are no partial results.
pub fn score(
    dataset: &Dataset,
    artifact: &ModelArtifact,
) -> Result<Vec<PredictionRecord>, ScoringError> {
    if dataset.is_empty() || !dataset.has_columns(&[LAT_COLUMN, LONG_COLUMN]) {
        return Err(ScoringError::InvalidDataset(
            "dataset must contain \"lat\" and \"long\" columns and not be empty".to_string(),
        ));
    }

    let coordinates = dataset
        .coordinates()
        .map_err(|e| ScoringError::InvalidDataset(e.to_string()))?;

    let features = FeatureMatrix::new(
        vec![LAT_COLUMN.to_string(), LONG_COLUMN.to_string()],
        coordinates.iter().map(|(lat, long)| vec![*lat, *long]).collect(),
    );

    let probabilities = match artifact.scaler() {
        Some(scaler) => artifact.model().predict_proba(&scaler.transform(&features)?)?,
        None => artifact.model().predict_proba(&features)?,
    };

    if probabilities.len() != coordinates.len() {
        return Err(ScoringError::PredictionFailed(format!(
            "model returned {} probabilities for {} rows",
            probabilities.len(),
            coordinates.len()
        )));
    }

    Ok(coordinates
        .into_iter()
        .zip(probabilities)
        .map(|((lat, long), risk)| PredictionRecord { lat, long, risk })
        .collect())
}

/// Runs full scoring passes over the configured dataset and publishes them to the cache.
pub struct RiskScorer {
    model: Arc<ModelSlot>,
    cache: Arc<PredictionCache>,
    dataset_path: PathBuf,
}

impl RiskScorer {
    pub fn new(model: Arc<ModelSlot>, cache: Arc<PredictionCache>, dataset_path: PathBuf) -> Self {
        Self {
            model,
            cache,
            dataset_path,
        }
    }

    /// Blocking: may load or train the model and reads the dataset from disk.
    pub fn run_pass(&self) -> Result<Arc<[PredictionRecord]>, ApiError> {
        let started = Instant::now();
        let result = self.score_current_dataset();
        metrics::SCORING_DURATION.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(records) => {
                let snapshot = self.cache.replace(records);
                metrics::SCORING_PASSES.with_label_values(&["success"]).inc();
                metrics::SCORED_LOCATIONS.set(snapshot.len() as i64);
                info!(
                    locations = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scoring pass complete"
                );
                Ok(snapshot)
            }
            Err(e) => {
                metrics::SCORING_PASSES.with_label_values(&["failure"]).inc();
                warn!("Scoring pass failed: {}", e);
                Err(e)
            }
        }
    }

    fn score_current_dataset(&self) -> Result<Vec<PredictionRecord>, ApiError> {
        let artifact = self.model.get_or_load()?;
        let dataset = Dataset::from_path(&self.dataset_path)?;
        Ok(score(&dataset, &artifact)?)
    }
}
