use crate::auth::{AuthService, TokenService};
use crate::cache::PredictionCache;
use crate::config::{Config, UploadConfig};
use crate::database::CredentialStore;
use crate::middleware::RateLimiter;
use crate::model::{ArtifactLoader, LogisticTrainer, ModelSlot, Trainer};
use crate::scoring::RiskScorer;
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;

/// Process-wide components shared by every worker.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub model: Arc<ModelSlot>,
    pub cache: Arc<PredictionCache>,
    pub scorer: Arc<RiskScorer>,
    pub limiter: RateLimiter,
    pub registry: Arc<Registry>,
    pub upload: UploadConfig,
    pub dataset_path: PathBuf,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>, registry: Arc<Registry>) -> Self {
        let tokens = TokenService::new(&config.auth.secret_key, config.auth.token_ttl_seconds);

        let trainer: Option<Arc<dyn Trainer>> = if config.model.auto_train {
            Some(Arc::new(LogisticTrainer::new(&config.model.dataset_path)))
        } else {
            None
        };
        let model = Arc::new(ModelSlot::new(ArtifactLoader::new(
            &config.model.artifact_path,
            trainer,
        )));

        let cache = Arc::new(PredictionCache::new());
        let scorer = Arc::new(RiskScorer::new(
            model.clone(),
            cache.clone(),
            config.model.dataset_path.clone(),
        ));

        Self {
            auth: Arc::new(AuthService::new(store, tokens)),
            model,
            cache,
            scorer,
            limiter: RateLimiter::new(config.auth.requests_per_minute),
            registry,
            upload: config.upload.clone(),
            dataset_path: config.model.dataset_path.clone(),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        self.auth.tokens()
    }
}
