pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod dataset;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod models;
pub mod scoring;
pub mod state;

// Re-exports for convenience
pub use cache::PredictionCache;
pub use scoring::RiskScorer;
pub use state::AppState;
