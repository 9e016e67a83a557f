use crate::database::StoreError;
use crate::dataset::DatasetError;
use crate::model::ModelError;
use crate::scoring::ScoringError;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Model not available: {0}")]
    ModelUnavailable(#[from] ModelError),

    #[error("Scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Credential store error: {0}")]
    Store(StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => ApiError::Conflict("User already exists".to_string()),
            other => ApiError::Store(other),
        }
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        ApiError::Internal(format!("blocking task failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(_: validator::ValidationErrors) -> Self {
        ApiError::BadRequest("Email and password required".to_string())
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = match self {
            ApiError::Store(err) => {
                error!("Credential store error: {}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            // Existing clients expect 400 for a taken email
            ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ModelUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Scoring(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Dataset(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    fn error_type(&self) -> &str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unauthorized => "unauthorized",
            ApiError::RateLimitExceeded => "rate_limit",
            ApiError::ModelUnavailable(ModelError::ArtifactNotFound(_)) => "artifact_not_found",
            ApiError::ModelUnavailable(ModelError::TrainingFailed(_)) => "training_failed",
            ApiError::ModelUnavailable(ModelError::InvalidArtifact(_)) => "invalid_artifact",
            ApiError::Scoring(ScoringError::InvalidDataset(_)) => "invalid_dataset",
            ApiError::Scoring(ScoringError::UnsupportedModel(_)) => "unsupported_model",
            ApiError::Scoring(ScoringError::PredictionFailed(_)) => "prediction_failed",
            ApiError::Dataset(_) => "dataset_error",
            ApiError::Store(_) => "database_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}
