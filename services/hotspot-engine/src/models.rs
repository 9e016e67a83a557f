use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ===== Users =====
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

// ===== Auth Requests =====
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(required, length(min = 1))]
    pub email: Option<String>,
    #[validate(required, length(min = 1))]
    pub password: Option<String>,
}

impl CredentialsRequest {
    /// Validated `(email, password)` pair; the email is trimmed, the password is kept verbatim.
    pub fn into_parts(self) -> Result<(String, String), validator::ValidationErrors> {
        let trimmed = CredentialsRequest {
            email: self.email.map(|e| e.trim().to_string()),
            password: self.password,
        };
        trimmed.validate()?;

        match (trimmed.email, trimmed.password) {
            (Some(email), Some(password)) => Ok((email, password)),
            _ => Err(validator::ValidationErrors::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

// ===== Predictions =====
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub lat: f64,
    pub long: f64,
    pub risk: f64, // 0-1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionsResponse {
    pub locations: Vec<PredictionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HotspotsResponse {
    pub hotspots: Vec<PredictionRecord>,
}

// ===== Uploads =====
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

// ===== Health =====
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub model_loaded: bool,
}
