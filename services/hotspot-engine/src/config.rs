use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Secret used when nothing else is configured. Only fit for local development.
pub const DEFAULT_SECRET_KEY: &str = "dev-secret";

/// Database URL selecting the in-process credential store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub model: ModelConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub require_ssl: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub token_ttl_seconds: i64,
    pub requests_per_minute: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    pub artifact_path: PathBuf,
    pub dataset_path: PathBuf,
    pub auto_train: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = Self::defaults()?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        builder = builder.add_source(Environment::with_prefix("HOTSPOT_ENGINE").separator("__"));

        // Conventional names used by the hosting platform
        if let Ok(secret) = env::var("SECRET_KEY") {
            builder = builder.set_override("auth.secret_key", secret)?;
        }

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        config::Config::builder()
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.workers", 4)?
            // Database defaults
            .set_default("database.url", MEMORY_DATABASE_URL)?
            .set_default("database.max_connections", 10)?
            .set_default("database.require_ssl", false)?
            // Auth defaults
            .set_default("auth.secret_key", DEFAULT_SECRET_KEY)?
            .set_default("auth.token_ttl_seconds", 3600)?
            .set_default("auth.requests_per_minute", 60)?
            // Model artifact and dataset locations, relative to the service root
            .set_default("model.artifact_path", "model/poaching_model.json")?
            .set_default("model.dataset_path", "datasets/poaching_data.csv")?
            .set_default("model.auto_train", true)?
            .set_default("upload.max_bytes", 10 * 1024 * 1024)
    }

    /// Configuration built from defaults only, ignoring the environment.
    pub fn default_values() -> Result<Self, ConfigError> {
        Self::defaults()?.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.auth.secret_key.is_empty() {
            return Err("Secret key is required".to_string());
        }

        if self.auth.token_ttl_seconds <= 0 {
            return Err("Token lifetime must be positive".to_string());
        }

        if self.auth.requests_per_minute == 0 {
            return Err("Auth rate limit must be positive".to_string());
        }

        if self.model.artifact_path.as_os_str().is_empty() {
            return Err("Model artifact path is required".to_string());
        }

        if self.model.dataset_path.as_os_str().is_empty() {
            return Err("Dataset path is required".to_string());
        }

        Ok(())
    }

    pub fn uses_default_secret(&self) -> bool {
        self.auth.secret_key == DEFAULT_SECRET_KEY
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.is_empty() || self.url == MEMORY_DATABASE_URL
    }

    /// URL handed to the connection pool.
    ///
    /// Some hosting providers still hand out `postgres://` URLs; those are
    /// rewritten to the canonical scheme, and `sslmode=require` is appended
    /// when SSL is mandatory and the URL does not already choose a mode.
    pub fn connection_url(&self) -> String {
        let mut url = match self.url.strip_prefix("postgres://") {
            Some(rest) => format!("postgresql://{}", rest),
            None => self.url.clone(),
        };

        if self.require_ssl && url.starts_with("postgresql://") && !url.contains("sslmode=") {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str("sslmode=require");
        }

        url
    }
}
