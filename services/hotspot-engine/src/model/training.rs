//! Default trainer: standard scaling followed by L2-regularized logistic regression.

use super::artifact::{sigmoid, Estimator, LogisticRegression, ModelArtifact, StandardScaler};
use super::loader::Trainer;
use crate::dataset::{
    self, ColumnError, Dataset, DatasetError, LAT_COLUMN, LONG_COLUMN, RISK_SCORE_COLUMN,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Rows whose `risk_score` exceeds this are labelled high risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.5;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Column(#[from] ColumnError),

    #[error("training dataset is empty")]
    EmptyDataset,

    #[error("failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
struct TrainingParams {
    /// Inverse regularization strength.
    c: f64,
    max_iter: usize,
    tolerance: f64,
    learning_rate: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tolerance: 1e-6,
            learning_rate: 1.0,
        }
    }
}

/// Fits the model from the dataset CSV and writes a bundle artifact.
pub struct LogisticTrainer {
    dataset_path: PathBuf,
    params: TrainingParams,
}

impl LogisticTrainer {
    pub fn new(dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            params: TrainingParams::default(),
        }
    }

    pub fn fit(&self, dataset: &Dataset) -> Result<ModelArtifact, TrainingError> {
        let coordinates = dataset.coordinates()?;
        let risk = dataset.column_f64(RISK_SCORE_COLUMN)?;
        if coordinates.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        let features: Vec<[f64; 2]> = coordinates
            .iter()
            .map(|(lat, long)| [*lat, *long])
            .collect();
        let labels: Vec<f64> = risk
            .iter()
            .map(|r| if *r > HIGH_RISK_THRESHOLD { 1.0 } else { 0.0 })
            .collect();

        let scaler = fit_scaler(&features);
        let scaled: Vec<[f64; 2]> = features
            .iter()
            .map(|row| {
                [
                    (row[0] - scaler.mean[0]) / scaler.scale[0],
                    (row[1] - scaler.mean[1]) / scaler.scale[1],
                ]
            })
            .collect();

        let (weights, bias, iterations) = fit_logistic(&scaled, &labels, &self.params);
        info!(
            rows = features.len(),
            positives = labels.iter().filter(|y| **y > 0.5).count(),
            iterations,
            "Logistic regression fitted"
        );

        Ok(ModelArtifact::ModelWithScaler {
            model: Estimator::LogisticRegression(LogisticRegression {
                coef: vec![weights.to_vec()],
                intercept: vec![bias],
                classes: vec![0, 1],
            }),
            scaler,
        })
    }

    pub fn train_to(&self, artifact_path: &Path) -> Result<ModelArtifact, TrainingError> {
        let data = Dataset::from_path(&self.dataset_path)?;
        let artifact = self.fit(&data)?;
        dataset::replace_file(artifact_path, &artifact.encode()?)?;
        info!("Saved model to {}", artifact_path.display());
        Ok(artifact)
    }
}

impl Trainer for LogisticTrainer {
    fn train(&self, artifact_path: &Path) -> Result<(), String> {
        self.train_to(artifact_path)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

fn fit_scaler(features: &[[f64; 2]]) -> StandardScaler {
    let n = features.len() as f64;
    let mut mean = [0.0; 2];
    for row in features {
        mean[0] += row[0] / n;
        mean[1] += row[1] / n;
    }

    let mut variance = [0.0; 2];
    for row in features {
        variance[0] += (row[0] - mean[0]).powi(2) / n;
        variance[1] += (row[1] - mean[1]).powi(2) / n;
    }

    let scale = variance.map(|v| {
        let std = v.sqrt();
        if std > f64::EPSILON {
            std
        } else {
            1.0
        }
    });

    StandardScaler {
        mean: mean.to_vec(),
        scale: scale.to_vec(),
        feature_names: Some(vec![LAT_COLUMN.to_string(), LONG_COLUMN.to_string()]),
    }
}

/// Full-batch gradient descent on the mean log-loss plus `||w||² / (2·C·n)`.
/// The intercept is not penalized.
fn fit_logistic(x: &[[f64; 2]], y: &[f64], params: &TrainingParams) -> ([f64; 2], f64, usize) {
    let n = x.len() as f64;
    let l2 = 1.0 / (params.c * n);
    let mut w = [0.0; 2];
    let mut b = 0.0;

    for iteration in 0..params.max_iter {
        let mut grad_w = [0.0; 2];
        let mut grad_b = 0.0;
        for (row, target) in x.iter().zip(y) {
            let err = sigmoid(w[0] * row[0] + w[1] * row[1] + b) - target;
            grad_w[0] += err * row[0] / n;
            grad_w[1] += err * row[1] / n;
            grad_b += err / n;
        }
        grad_w[0] += l2 * w[0];
        grad_w[1] += l2 * w[1];

        let norm = (grad_w[0].powi(2) + grad_w[1].powi(2) + grad_b.powi(2)).sqrt();
        if norm < params.tolerance {
            return (w, b, iteration);
        }

        w[0] -= params.learning_rate * grad_w[0];
        w[1] -= params.learning_rate * grad_w[1];
        b -= params.learning_rate * grad_b;
    }

    (w, b, params.max_iter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::FeatureMatrix;

    const TRAINING_CSV: &str = "lat,long,risk_score\n\
        -1.0,30.0,0.9\n\
        -1.2,30.5,0.8\n\
        -0.9,29.8,0.7\n\
        -3.0,36.0,0.1\n\
        -3.2,36.4,0.2\n\
        -2.9,35.9,0.0\n";

    #[test]
    fn test_fit_separates_high_and_low_risk() {
        let dataset = Dataset::from_bytes(TRAINING_CSV.as_bytes()).unwrap();
        let artifact = LogisticTrainer::new("unused.csv").fit(&dataset).unwrap();

        let scaler = artifact.scaler().unwrap();
        assert_eq!(
            scaler.feature_names.as_deref(),
            Some(&["lat".to_string(), "long".to_string()][..])
        );

        let x = FeatureMatrix::new(
            vec!["lat".into(), "long".into()],
            vec![vec![-1.0, 30.0], vec![-3.0, 36.0]],
        );
        let probs = artifact
            .model()
            .predict_proba(&scaler.transform(&x).unwrap())
            .unwrap();
        assert!(probs[0] > 0.5, "high-risk site scored {}", probs[0]);
        assert!(probs[1] < 0.5, "low-risk site scored {}", probs[1]);
    }

    #[test]
    fn test_fit_constant_feature_keeps_unit_scale() {
        let dataset =
            Dataset::from_bytes(b"lat,long,risk_score\n1.0,5.0,0.9\n1.0,6.0,0.1\n").unwrap();
        let artifact = LogisticTrainer::new("unused.csv").fit(&dataset).unwrap();
        assert_eq!(artifact.scaler().unwrap().scale[0], 1.0);
    }

    #[test]
    fn test_fit_requires_columns_and_rows() {
        let no_label = Dataset::from_bytes(b"lat,long\n1,2\n").unwrap();
        assert!(matches!(
            LogisticTrainer::new("unused.csv").fit(&no_label),
            Err(TrainingError::Column(ColumnError::Missing(_)))
        ));

        let empty = Dataset::from_bytes(b"lat,long,risk_score\n").unwrap();
        assert!(matches!(
            LogisticTrainer::new("unused.csv").fit(&empty),
            Err(TrainingError::EmptyDataset)
        ));
    }

    #[test]
    fn test_train_to_writes_loadable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let dataset_path = dir.path().join("poaching_data.csv");
        std::fs::write(&dataset_path, TRAINING_CSV).unwrap();
        let artifact_path = dir.path().join("model").join("poaching_model.json");

        let trained = LogisticTrainer::new(&dataset_path).train_to(&artifact_path).unwrap();
        let bytes = std::fs::read(&artifact_path).unwrap();
        let loaded = ModelArtifact::decode(&bytes).unwrap();

        assert!(matches!(loaded, ModelArtifact::ModelWithScaler { .. }));
        assert_eq!(loaded.model().kind(), "logistic_regression");
        let x = FeatureMatrix::new(vec!["lat".into(), "long".into()], vec![vec![-2.0, 33.0]]);
        let score = |artifact: &ModelArtifact| {
            let scaled = artifact.scaler().unwrap().transform(&x).unwrap();
            artifact.model().predict_proba(&scaled).unwrap()
        };
        let (expected, actual) = (score(&trained), score(&loaded));
        assert!((expected[0] - actual[0]).abs() < 1e-9);
    }

    #[test]
    fn test_train_without_dataset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = LogisticTrainer::new(dir.path().join("missing.csv"));
        let err = trainer.train(&dir.path().join("model.json")).unwrap_err();
        assert!(err.contains("not found"));
    }
}
