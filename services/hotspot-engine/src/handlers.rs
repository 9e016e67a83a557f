use crate::cache::HOTSPOT_LIMIT;
use crate::dataset::{self, Dataset};
use crate::errors::{ApiError, Result};
use crate::metrics;
use crate::middleware::{AuthenticatedUser, JwtAuth};
use crate::models::*;
use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt;
use std::path::Path;
use tracing::{info, warn};

// ===== Health Check =====
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.model.is_loaded(),
    })
}

// ===== Metrics =====
pub async fn metrics_endpoint(state: web::Data<AppState>) -> Result<HttpResponse> {
    let body = metrics::render(&state.registry)
        .map_err(|e| ApiError::Internal(format!("failed to render metrics: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

// ===== Auth =====
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse> {
    let (email, password) = body.into_inner().into_parts()?;
    let token = state.auth.register(email, password).await?;
    Ok(HttpResponse::Created().json(TokenResponse { token }))
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse> {
    let (email, password) = body.into_inner().into_parts()?;
    let token = state.auth.login(email, password).await?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

// ===== Predictions =====
pub async fn predict(user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let scorer = state.scorer.clone();
    let snapshot = web::block(move || scorer.run_pass()).await??;

    info!(
        user_id = user.user_id(),
        locations = snapshot.len(),
        "Served predictions"
    );
    Ok(HttpResponse::Ok().json(PredictionsResponse {
        locations: snapshot.to_vec(),
    }))
}

pub async fn hotspots(user: AuthenticatedUser, state: web::Data<AppState>) -> HttpResponse {
    let hotspots = state.cache.hotspots(HOTSPOT_LIMIT);
    info!(user_id = user.user_id(), count = hotspots.len(), "Served hotspots");
    HttpResponse::Ok().json(HotspotsResponse { hotspots })
}

// ===== Dataset Upload =====
pub async fn upload_dataset(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let result = receive_dataset(&state, payload).await;
    let outcome = if result.is_ok() { "success" } else { "rejected" };
    metrics::DATASET_UPLOADS.with_label_values(&[outcome]).inc();

    let response = result?;
    info!(
        user_id = user.user_id(),
        filename = %response.filename,
        rows = response.rows,
        "Dataset replaced"
    );
    Ok(HttpResponse::Ok().json(response))
}

async fn receive_dataset(state: &AppState, mut payload: Multipart) -> Result<UploadResponse> {
    let max_bytes = state.upload.max_bytes;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let disposition = field.content_disposition();
        let is_file_part = disposition.get_name() == Some("file");
        let filename = disposition.get_filename().map(str::to_string);

        // A part named `file` wins; otherwise the first part carrying a filename
        if is_file_part || (upload.is_none() && filename.is_some()) {
            let bytes = read_field(&mut field, max_bytes).await?;
            upload = Some((filename.unwrap_or_default(), bytes));
            if is_file_part {
                break;
            }
        } else {
            while field.try_next().await.map_err(multipart_error)?.is_some() {}
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No file part".to_string()))?;
    let filename = sanitize_filename(&filename)
        .ok_or_else(|| ApiError::BadRequest("No selected file".to_string()))?;
    if !filename.to_ascii_lowercase().ends_with(".csv") {
        return Err(ApiError::BadRequest("File must be a CSV".to_string()));
    }

    let dataset_path = state.dataset_path.clone();
    let (rows, columns) = web::block(move || -> Result<(usize, Vec<String>)> {
        let parsed = Dataset::from_bytes(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("Invalid CSV: {}", e)))?;
        dataset::replace_file(&dataset_path, &bytes)
            .map_err(|e| ApiError::Internal(format!("failed to store dataset: {}", e)))?;
        Ok((parsed.len(), parsed.headers().to_vec()))
    })
    .await??;

    Ok(UploadResponse {
        message: "File uploaded successfully".to_string(),
        filename,
        rows,
        columns,
    })
}

async fn read_field(field: &mut Field, max_bytes: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(ApiError::BadRequest(format!(
                "File exceeds the {} byte limit",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Final path component of a client-supplied filename, or `None` if nothing usable remains.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

fn multipart_error(err: actix_multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Malformed multipart body: {}", err))
}

fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!(path = req.path(), "Rejected JSON body: {}", err);
    ApiError::BadRequest(format!("Invalid JSON body: {}", err)).into()
}

/// Registers every route. Auth routes are rate limited; data routes require a bearer token.
pub fn configure_routes(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        let jwt = JwtAuth::new(state.tokens().clone());
        let limiter = state.limiter.clone();

        cfg.app_data(web::Data::new(state))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(
                web::resource(["/register", "/auth/register", "/api/auth/register"])
                    .wrap(limiter.clone())
                    .route(web::post().to(register)),
            )
            .service(
                web::resource(["/login", "/auth/login", "/api/auth/login"])
                    .wrap(limiter)
                    .route(web::post().to(login)),
            )
            .service(
                web::resource("/api/upload")
                    .wrap(jwt.clone())
                    .route(web::post().to(upload_dataset)),
            )
            .service(
                web::resource(["/predict", "/api/predict"])
                    .wrap(jwt.clone())
                    .route(web::get().to(predict)),
            )
            .service(
                web::resource(["/hotspots", "/api/hotspots"])
                    .wrap(jwt)
                    .route(web::get().to(hotspots)),
            )
            .route("/health", web::get().to(health_check))
            .route("/metrics", web::get().to(metrics_endpoint));
    }
}
