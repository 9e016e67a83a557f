use actix_cors::Cors;
use actix_web::{dev::Service, middleware, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use hotspot_engine::{config::Config, database, handlers, metrics, AppState};
use prometheus::Registry;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Hotspot Engine...");

    // Load configuration
    let config = Config::from_env().context("failed to load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;
    if config.uses_default_secret() {
        warn!("Using the default secret key; set SECRET_KEY outside local development");
    }
    info!("Configuration loaded successfully");

    let store = database::connect_store(&config.database)
        .await
        .context("failed to connect credential store")?;
    store
        .health_check()
        .await
        .context("credential store health check failed")?;
    info!("Credential store health check passed");

    let registry = Arc::new(Registry::new());
    metrics::register_metrics(&registry).context("failed to register metrics")?;

    let state = AppState::new(&config, store, registry);

    // A failed startup load is retried on the first prediction request
    let model = state.model.clone();
    tokio::task::spawn_blocking(move || model.initialize()).await?;

    let server_config = config.server.clone();
    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let fut = srv.call(req);
                async move {
                    let res = fut.await?;
                    let path = res
                        .request()
                        .match_pattern()
                        .unwrap_or_else(|| "unmatched".to_string());
                    metrics::HTTP_REQUESTS_TOTAL
                        .with_label_values(&[method.as_str(), path.as_str(), res.status().as_str()])
                        .inc();
                    Ok(res)
                }
            })
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .configure(handlers::configure_routes(state.clone()))
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    Ok(())
}
