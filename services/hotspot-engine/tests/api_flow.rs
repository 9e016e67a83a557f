use actix_web::{
    http::{header, StatusCode},
    test, App,
};
use hotspot_engine::{config::Config, database::InMemoryCredentialStore, handlers, AppState};
use prometheus::Registry;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const MODEL_JSON: &str =
    r#"{"kind": "logistic_regression", "coef": [[1.0, -1.0]], "intercept": [0.0]}"#;

const THREE_SITES: &str = "lat,long\n1.0,0.0\n0.0,1.0\n0.5,0.5\n";

const TRAINING_CSV: &str = "lat,long,risk_score\n\
    -1.0,30.0,0.9\n\
    -1.2,30.5,0.8\n\
    -3.0,36.0,0.1\n\
    -3.2,36.4,0.2\n";

struct Fixture {
    _dir: TempDir,
    artifact_path: PathBuf,
    state: AppState,
}

fn fixture(model: Option<&str>, dataset: &str, configure: impl FnOnce(&mut Config)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default_values().unwrap();
    config.model.artifact_path = dir.path().join("model").join("poaching_model.json");
    config.model.dataset_path = dir.path().join("datasets").join("poaching_data.csv");
    config.model.auto_train = false;
    configure(&mut config);

    write(&config.model.dataset_path, dataset);
    if let Some(model) = model {
        write(&config.model.artifact_path, model);
    }

    let state = AppState::new(
        &config,
        Arc::new(InMemoryCredentialStore::new()),
        Arc::new(Registry::new()),
    );
    Fixture {
        _dir: dir,
        artifact_path: config.model.artifact_path.clone(),
        state,
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn post_json(uri: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post().uri(uri).set_json(body)
}

fn get_with_token(uri: &str, token: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> (String, Vec<u8>) {
    let boundary = "----hotspot-test-boundary";
    let mut body = String::new();
    for (name, filename, contents) in parts {
        body.push_str(&format!("--{}\r\n", boundary));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n",
                name, filename
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(contents);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    (
        format!("multipart/form-data; boundary={}", boundary),
        body.into_bytes(),
    )
}

fn upload_request(token: &str, parts: &[(&str, Option<&str>, &str)]) -> test::TestRequest {
    let (content_type, body) = multipart(parts);
    test::TestRequest::post()
        .uri("/api/upload")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
}

fn risks(records: &Value) -> Vec<f64> {
    records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["risk"].as_f64().unwrap())
        .collect()
}

#[actix_web::test]
async fn test_register_login_predict_hotspots() {
    let fx = fixture(Some(MODEL_JSON), THREE_SITES, |_| {});
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;
    let creds = json!({"email": "ranger@example.org", "password": "s3cret"});

    let resp = test::call_service(&app, post_json("/register", creds.clone()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let registered: Value = test::read_body_json(resp).await;
    let registered_claims = fx
        .state
        .tokens()
        .verify(registered["token"].as_str().unwrap())
        .unwrap();

    let resp = test::call_service(&app, post_json("/login", creds).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let logged_in: Value = test::read_body_json(resp).await;
    let token = logged_in["token"].as_str().unwrap().to_string();
    assert_eq!(
        fx.state.tokens().verify(&token).unwrap().user_id,
        registered_claims.user_id
    );

    // Nothing scored yet
    let resp = test::call_service(&app, get_with_token("/hotspots", &token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["hotspots"].as_array().unwrap().is_empty());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/predict").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, get_with_token("/predict", &token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let locations = body["locations"].as_array().unwrap();
    assert_eq!(locations.len(), 3);
    assert_eq!(locations[0]["lat"], json!(1.0));
    assert_eq!(locations[1]["long"], json!(1.0));
    assert!(risks(&body["locations"]).iter().all(|r| (0.0..=1.0).contains(r)));

    let resp = test::call_service(&app, get_with_token("/api/hotspots", &token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let ranked = risks(&body["hotspots"]);
    assert_eq!(ranked.len(), 3);
    assert!(ranked.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(body["hotspots"][0]["lat"], json!(1.0));
}

#[actix_web::test]
async fn test_auth_failures() {
    let fx = fixture(Some(MODEL_JSON), THREE_SITES, |_| {});
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;

    let creds = json!({"email": "a@example.org", "password": "right"});
    let resp = test::call_service(&app, post_json("/auth/register", creds).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Taken email, on another alias
    let creds = json!({"email": "a@example.org", "password": "other"});
    let resp = test::call_service(&app, post_json("/api/auth/register", creds).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "User already exists");

    for creds in [
        json!({"email": "a@example.org", "password": "wrong"}),
        json!({"email": "nobody@example.org", "password": "right"}),
    ] {
        let resp = test::call_service(&app, post_json("/api/auth/login", creds).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    for creds in [
        json!({}),
        json!({"email": "a@example.org"}),
        json!({"email": "  ", "password": "x"}),
        json!({"email": "a@example.org", "password": ""}),
    ] {
        let resp = test::call_service(&app, post_json("/register", creds).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    let req = test::TestRequest::post()
        .uri("/login")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "bad_request");
}

#[actix_web::test]
async fn test_upload_replaces_dataset() {
    let fx = fixture(Some(MODEL_JSON), THREE_SITES, |_| {});
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;
    let token = fx.state.tokens().issue("uploader").unwrap();

    let csv = "lat,long\n1,1\n2,2\n3,3\n4,4\n5,5\n";
    let resp = test::call_service(
        &app,
        upload_request(&token, &[("note", None, "ignored"), ("file", Some("sites.csv"), csv)])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["filename"], "sites.csv");
    assert_eq!(body["rows"], 5);
    assert_eq!(body["columns"], json!(["lat", "long"]));
    assert_eq!(fs::read_to_string(&fx.state.dataset_path).unwrap(), csv);

    let resp = test::call_service(&app, get_with_token("/api/predict", &token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["locations"].as_array().unwrap().len(), 5);

    // Any part with a filename is accepted when none is named `file`
    let resp = test::call_service(
        &app,
        upload_request(&token, &[("dataset", Some("other.CSV"), THREE_SITES)]).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_upload_rejections_keep_dataset() {
    let fx = fixture(Some(MODEL_JSON), THREE_SITES, |config| {
        config.upload.max_bytes = 64;
    });
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;
    let token = fx.state.tokens().issue("uploader").unwrap();

    let too_big = format!("lat,long\n{}", "1.0,2.0\n".repeat(20));
    let rejected: Vec<Vec<(&str, Option<&str>, &str)>> = vec![
        vec![("note", None, "no file here")],
        vec![("file", Some(""), "lat,long\n1,2\n")],
        vec![("file", Some("sites.txt"), "lat,long\n1,2\n")],
        vec![("file", Some("ragged.csv"), "lat,long\n1,2,3\n")],
        vec![("file", Some("big.csv"), too_big.as_str())],
    ];

    for parts in &rejected {
        let resp = test::call_service(&app, upload_request(&token, parts).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "parts {:?}", parts);
    }
    assert_eq!(fs::read_to_string(&fx.state.dataset_path).unwrap(), THREE_SITES);

    let (content_type, body) = multipart(&[("file", Some("sites.csv"), THREE_SITES)]);
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_predict_trains_missing_model() {
    let fx = fixture(None, TRAINING_CSV, |config| config.model.auto_train = true);
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;
    let token = fx.state.tokens().issue("ranger").unwrap();

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], false);

    let resp = test::call_service(&app, get_with_token("/predict", &token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let risk = risks(&body["locations"]);
    assert_eq!(risk.len(), 4);
    assert!(risk[0] > 0.5 && risk[2] < 0.5);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["model_loaded"], true);
}

#[actix_web::test]
async fn test_predict_without_model_is_server_error() {
    let fx = fixture(None, THREE_SITES, |_| {});
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;
    let token = fx.state.tokens().issue("ranger").unwrap();

    let resp = test::call_service(&app, get_with_token("/predict", &token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "artifact_not_found");

    // The model appearing later is picked up by the next request
    write(&fx.artifact_path, MODEL_JSON);
    let resp = test::call_service(&app, get_with_token("/predict", &token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_auth_routes_are_rate_limited() {
    let fx = fixture(Some(MODEL_JSON), THREE_SITES, |config| {
        config.auth.requests_per_minute = 2;
    });
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;
    let creds = json!({"email": "nobody@example.org", "password": "x"});

    for _ in 0..2 {
        let resp = test::call_service(&app, post_json("/login", creds.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = test::call_service(&app, post_json("/login", creds).to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    // Data routes are not limited
    let token = fx.state.tokens().issue("ranger").unwrap();
    for _ in 0..3 {
        let resp = test::call_service(&app, get_with_token("/hotspots", &token).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[actix_web::test]
async fn test_metrics_endpoint() {
    let fx = fixture(Some(MODEL_JSON), THREE_SITES, |_| {});
    hotspot_engine::metrics::register_metrics(&fx.state.registry).unwrap();
    let app = test::init_service(App::new().configure(handlers::configure_routes(fx.state.clone())))
        .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(std::str::from_utf8(&body).unwrap().contains("scoring_duration_seconds"));
}
