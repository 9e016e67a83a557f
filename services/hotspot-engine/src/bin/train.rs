//! Trains the risk model from the configured dataset and writes the artifact.
//!
//! Usage: `train [--check]`. With `--check`, the saved artifact is reloaded and
//! used to score the first dataset row.

use anyhow::{bail, Context};
use dotenv::dotenv;
use hotspot_engine::config::Config;
use hotspot_engine::dataset::{Dataset, LAT_COLUMN, LONG_COLUMN};
use hotspot_engine::model::{FeatureMatrix, LogisticTrainer, ModelArtifact};
use std::fs;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let check = match std::env::args().nth(1).as_deref() {
        None => false,
        Some("--check") => true,
        Some(other) => bail!("unknown argument '{}'; usage: train [--check]", other),
    };

    let config = Config::from_env().context("failed to load configuration")?;
    let artifact_path = &config.model.artifact_path;
    let dataset_path = &config.model.dataset_path;

    LogisticTrainer::new(dataset_path)
        .train_to(artifact_path)
        .with_context(|| format!("training from {} failed", dataset_path.display()))?;
    println!("Saved model to {}", artifact_path.display());

    if check {
        let bytes = fs::read(artifact_path)?;
        let artifact = ModelArtifact::decode(&bytes)?;
        let dataset = Dataset::from_path(dataset_path)?;
        let Some(&(lat, long)) = dataset.coordinates()?.first() else {
            bail!("dataset {} has no rows", dataset_path.display());
        };

        let mut sample = FeatureMatrix::new(
            vec![LAT_COLUMN.to_string(), LONG_COLUMN.to_string()],
            vec![vec![lat, long]],
        );
        if let Some(scaler) = artifact.scaler() {
            sample = scaler.transform(&sample)?;
        }

        let prediction = artifact.model().predict(&sample)?;
        let probability = artifact.model().predict_proba(&sample)?;
        println!("Sample (lat, long): ({}, {})", lat, long);
        println!("Prediction (0=low risk, 1=high risk): {}", prediction[0]);
        println!("High-risk probability: {:.4}", probability[0]);
    }

    Ok(())
}
