//! On-disk model artifact and the estimators it can hold.
//!
//! An artifact is a JSON document in one of two shapes:
//!
//! * a bundle, `{"model": <estimator>, "scaler": <scaler>}` with the scaler optional;
//! * a bare estimator, `{"kind": "logistic_regression", ...}`, written by older tooling.
//!
//! Both are normalized into [`ModelArtifact`] once, at load time.

use super::ModelError;
use crate::scoring::ScoringError;
use serde::{Deserialize, Serialize};

/// Named feature columns, one row per observation.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression(LogisticRegression),
    LinearSvc(LinearSvc),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,
}

/// Margin classifier without calibrated probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvc {
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelArtifact {
    RawModel(Estimator),
    ModelWithScaler {
        model: Estimator,
        scaler: StandardScaler,
    },
}

#[derive(Deserialize)]
struct ArtifactBundle {
    #[serde(default)]
    model: Option<Estimator>,
    #[serde(default)]
    scaler: Option<StandardScaler>,
}

#[derive(Serialize)]
struct ArtifactBundleRef<'a> {
    model: &'a Estimator,
    #[serde(skip_serializing_if = "Option::is_none")]
    scaler: Option<&'a StandardScaler>,
}

impl ModelArtifact {
    pub fn decode(bytes: &[u8]) -> Result<Self, ModelError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| ModelError::InvalidArtifact(format!("not valid JSON: {}", e)))?;

        let is_bundle = value
            .as_object()
            .map_or(false, |obj| obj.contains_key("model") || obj.contains_key("scaler"));

        let artifact = if is_bundle {
            let bundle: ArtifactBundle = serde_json::from_value(value)
                .map_err(|e| ModelError::InvalidArtifact(e.to_string()))?;
            let model = bundle.model.ok_or_else(|| {
                ModelError::InvalidArtifact("artifact did not contain a 'model' entry".to_string())
            })?;
            match bundle.scaler {
                Some(scaler) => ModelArtifact::ModelWithScaler { model, scaler },
                None => ModelArtifact::RawModel(model),
            }
        } else {
            let model: Estimator = serde_json::from_value(value)
                .map_err(|e| ModelError::InvalidArtifact(e.to_string()))?;
            ModelArtifact::RawModel(model)
        };

        artifact.check_shapes()?;
        Ok(artifact)
    }

    /// Always written as a bundle.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&ArtifactBundleRef {
            model: self.model(),
            scaler: self.scaler(),
        })
    }

    pub fn model(&self) -> &Estimator {
        match self {
            ModelArtifact::RawModel(model) => model,
            ModelArtifact::ModelWithScaler { model, .. } => model,
        }
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        match self {
            ModelArtifact::RawModel(_) => None,
            ModelArtifact::ModelWithScaler { scaler, .. } => Some(scaler),
        }
    }

    fn check_shapes(&self) -> Result<(), ModelError> {
        let (coef, intercept, classes) = self.model().parameters();
        if coef.len() != 1 || coef[0].is_empty() {
            return Err(ModelError::InvalidArtifact(
                "binary estimator needs exactly one non-empty coefficient row".to_string(),
            ));
        }
        if intercept.len() != 1 {
            return Err(ModelError::InvalidArtifact(
                "binary estimator needs exactly one intercept".to_string(),
            ));
        }
        if classes.len() != 2 {
            return Err(ModelError::InvalidArtifact(format!(
                "expected 2 classes, found {}",
                classes.len()
            )));
        }

        if let Some(scaler) = self.scaler() {
            if scaler.mean.len() != scaler.scale.len() {
                return Err(ModelError::InvalidArtifact(
                    "scaler mean and scale lengths differ".to_string(),
                ));
            }
            if scaler.mean.len() != coef[0].len() {
                return Err(ModelError::InvalidArtifact(format!(
                    "scaler expects {} features, model expects {}",
                    scaler.mean.len(),
                    coef[0].len()
                )));
            }
            if let Some(names) = &scaler.feature_names {
                if names.len() != scaler.mean.len() {
                    return Err(ModelError::InvalidArtifact(
                        "scaler feature names do not match its width".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Estimator {
    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::LogisticRegression(_) => "logistic_regression",
            Estimator::LinearSvc(_) => "linear_svc",
        }
    }

    fn parameters(&self) -> (&[Vec<f64>], &[f64], &[i64]) {
        match self {
            Estimator::LogisticRegression(m) => (&m.coef, &m.intercept, &m.classes),
            Estimator::LinearSvc(m) => (&m.coef, &m.intercept, &m.classes),
        }
    }

    /// Signed distance to the separating hyperplane for every row.
    pub fn decision_function(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        let (coef, intercept, _) = self.parameters();
        let (weights, bias) = match (coef.first(), intercept.first()) {
            (Some(w), Some(b)) => (w, *b),
            _ => {
                return Err(ScoringError::PredictionFailed(
                    "estimator has no coefficients".to_string(),
                ))
            }
        };

        if x.n_features() != weights.len() {
            return Err(ScoringError::PredictionFailed(format!(
                "X has {} features, but {} is expecting {} features as input",
                x.n_features(),
                self.kind(),
                weights.len()
            )));
        }

        x.rows
            .iter()
            .map(|row| {
                if row.len() != weights.len() {
                    return Err(ScoringError::PredictionFailed(format!(
                        "row has {} values, expected {}",
                        row.len(),
                        weights.len()
                    )));
                }
                Ok(bias + row.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>())
            })
            .collect()
    }

    /// Probability of the positive class (`classes[1]`) for every row.
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        match self {
            Estimator::LogisticRegression(_) => {
                let probabilities: Vec<f64> =
                    self.decision_function(x)?.into_iter().map(sigmoid).collect();
                if let Some(bad) = probabilities.iter().find(|p| !p.is_finite()) {
                    return Err(ScoringError::PredictionFailed(format!(
                        "model produced a non-finite probability ({})",
                        bad
                    )));
                }
                Ok(probabilities)
            }
            Estimator::LinearSvc(_) => Err(ScoringError::UnsupportedModel(format!(
                "{} does not support predict_proba",
                self.kind()
            ))),
        }
    }

    /// Hard class labels.
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<i64>, ScoringError> {
        let (_, _, classes) = self.parameters();
        let (negative, positive) = match classes {
            [negative, positive] => (*negative, *positive),
            _ => {
                return Err(ScoringError::PredictionFailed(
                    "estimator is not binary".to_string(),
                ))
            }
        };

        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(|d| if d > 0.0 { positive } else { negative })
            .collect())
    }
}

impl StandardScaler {
    pub fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix, ScoringError> {
        if let Some(names) = &self.feature_names {
            if names != &x.columns {
                return Err(ScoringError::PredictionFailed(format!(
                    "failed to scale features: scaler was fitted on {:?}, got {:?}",
                    names, x.columns
                )));
            }
        } else if x.n_features() != self.mean.len() {
            return Err(ScoringError::PredictionFailed(format!(
                "failed to scale features: expected {} features, got {}",
                self.mean.len(),
                x.n_features()
            )));
        }

        let rows = x
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(v, (mean, scale))| {
                        let scale = if *scale == 0.0 { 1.0 } else { *scale };
                        (v - mean) / scale
                    })
                    .collect()
            })
            .collect();

        Ok(FeatureMatrix::new(x.columns.clone(), rows))
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
