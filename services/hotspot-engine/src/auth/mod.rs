//! Account registration and login.

pub mod password;
pub mod token;

pub use token::{Claims, TokenError, TokenService};

use crate::database::CredentialStore;
use crate::errors::{ApiError, Result};
use crate::metrics;
use crate::models::NewUser;
use std::sync::Arc;
use tracing::{info, warn};

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(&self, email: String, password: String) -> Result<String> {
        if self.store.find_by_email(&email).await?.is_some() {
            metrics::AUTH_ATTEMPTS.with_label_values(&["register", "conflict"]).inc();
            return Err(ApiError::Conflict("User already exists".to_string()));
        }

        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(ApiError::Internal)?;

        let user = match self.store.insert(NewUser { email, password_hash }).await {
            Ok(user) => user,
            Err(e) => {
                metrics::AUTH_ATTEMPTS.with_label_values(&["register", "failed"]).inc();
                return Err(e.into());
            }
        };

        let token = self.issue(&user.id.to_string())?;
        metrics::AUTH_ATTEMPTS.with_label_values(&["register", "success"]).inc();
        info!(user_id = %user.id, "User registered");
        Ok(token)
    }

    pub async fn login(&self, email: String, password: String) -> Result<String> {
        let Some(user) = self.store.find_by_email(&email).await? else {
            metrics::AUTH_ATTEMPTS.with_label_values(&["login", "rejected"]).inc();
            return Err(ApiError::Unauthorized);
        };

        let stored_hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || {
            password::verify_password(&password, &stored_hash)
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

        match verified {
            Ok(true) => {}
            Ok(false) => {
                metrics::AUTH_ATTEMPTS.with_label_values(&["login", "rejected"]).inc();
                return Err(ApiError::Unauthorized);
            }
            Err(e) => {
                warn!(user_id = %user.id, "Stored password hash unusable: {}", e);
                metrics::AUTH_ATTEMPTS.with_label_values(&["login", "rejected"]).inc();
                return Err(ApiError::Unauthorized);
            }
        }

        let token = self.issue(&user.id.to_string())?;
        metrics::AUTH_ATTEMPTS.with_label_values(&["login", "success"]).inc();
        info!(user_id = %user.id, "User logged in");
        Ok(token)
    }

    fn issue(&self, user_id: &str) -> Result<String> {
        self.tokens
            .issue(user_id)
            .map_err(|e| ApiError::Internal(e.to_string()))
    }
}
