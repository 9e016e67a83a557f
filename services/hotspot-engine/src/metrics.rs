use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"]
    ).expect("metric can be created");

    // Auth metrics
    pub static ref AUTH_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("auth_attempts_total", "Registration and login attempts"),
        &["action", "outcome"]
    ).expect("metric can be created");

    // Model metrics
    pub static ref MODEL_LOADS: IntCounterVec = IntCounterVec::new(
        Opts::new("model_loads_total", "Model artifact load attempts"),
        &["outcome"]
    ).expect("metric can be created");

    // Scoring metrics
    pub static ref SCORING_PASSES: IntCounterVec = IntCounterVec::new(
        Opts::new("scoring_passes_total", "Full dataset scoring passes"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref SCORING_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("scoring_duration_seconds", "Duration of a full scoring pass in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0])
    ).expect("metric can be created");

    pub static ref SCORED_LOCATIONS: IntGauge = IntGauge::new(
        "scored_locations",
        "Number of locations held by the prediction cache"
    ).expect("metric can be created");

    // Dataset metrics
    pub static ref DATASET_UPLOADS: IntCounterVec = IntCounterVec::new(
        Opts::new("dataset_uploads_total", "Dataset uploads"),
        &["outcome"]
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(AUTH_ATTEMPTS.clone()))?;
    registry.register(Box::new(MODEL_LOADS.clone()))?;
    registry.register(Box::new(SCORING_PASSES.clone()))?;
    registry.register(Box::new(SCORING_DURATION.clone()))?;
    registry.register(Box::new(SCORED_LOCATIONS.clone()))?;
    registry.register(Box::new(DATASET_UPLOADS.clone()))?;

    // CPU, memory and file descriptor usage of this process
    #[cfg(target_os = "linux")]
    registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    Ok(())
}

/// Generate metrics output in Prometheus text format
pub fn render(registry: &Registry) -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
