//! Router-level tests with an unreachable generation backend

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;

use lead_engine::{EngineState, InMemoryAnalyticsStore, InMemoryLeadStore, PersonalizationEngine};
use lead_engine_config::Settings;
use lead_engine_core::{BackendError, GenerationBackend, GenerationRequest, GenerationResponse};
use lead_engine_server::{create_router, AppState};

const LEADS: &str = r#"
leads:
  - id: lead-1
    name: Dana Reyes
    company: Northwind
    industry: Logistics
    role: Head of Operations
"#;

struct RejectingBackend;

#[async_trait]
impl GenerationBackend for RejectingBackend {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        Err(BackendError::Rejected("quota exhausted".to_string()))
    }

    fn name(&self) -> &str {
        "rejecting"
    }
}

fn app() -> Router {
    let settings = Settings::default();
    let store = InMemoryLeadStore::from_yaml_str(LEADS).unwrap();
    let state = Arc::new(EngineState::new(
        &settings.engine,
        Arc::new(InMemoryAnalyticsStore::new()),
    ));
    let engine = PersonalizationEngine::new(
        Arc::new(store),
        Arc::new(RejectingBackend),
        state,
        &settings.engine,
    )
    .unwrap();
    create_router(AppState::new(engine, settings))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn new_test_body() -> serde_json::Value {
    serde_json::json!({
        "name": "consultative vs urgency",
        "variants": [
            {"id": "control", "name": "Consultative", "is_control": true, "strategy": "consultative"},
            {"id": "urgency", "name": "Urgency", "strategy": "urgency"}
        ],
        "primary_metric": "conversion_rate"
    })
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_lead_is_not_found() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/leads/missing/script",
        Some(serde_json::json!({"objective": "discovery"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_unavailable_backend_yields_fallback_script() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/leads/lead-1/script",
        Some(serde_json::json!({"objective": "closing", "deadline_ms": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["script"]["is_fallback"], true);
    assert!(body["reason"].is_string());
}

#[tokio::test]
async fn test_analysis_unavailable_is_503() {
    let app = app();
    let (status, _) = send(&app, "POST", "/api/leads/lead-1/analysis", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_ab_test_lifecycle() {
    let app = app();
    let (status, created) = send(&app, "POST", "/api/ab-tests", Some(new_test_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "draft");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "POST", &format!("/api/ab-tests/{}/pause", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, started) = send(&app, "POST", &format!("/api/ab-tests/{}/start", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "running");

    let (status, results) =
        send(&app, "GET", &format!("/api/ab-tests/{}/results", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["statistical_significance"], false);
    assert_eq!(results["total_participants"], 0);

    let (status, listed) = send(&app, "GET", "/api/ab-tests", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/ab-tests/{}/observations", id),
        Some(serde_json::json!({"lead_id": "never-assigned", "value": 1.0})),
    )
    .await;
    assert!(status.is_client_error());

    let (status, done) =
        send(&app, "POST", &format!("/api/ab-tests/{}/complete", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
}

#[tokio::test]
async fn test_invalid_and_unknown_tests() {
    let app = app();
    let mut body = new_test_body();
    body["traffic_split"] = serde_json::json!({"control": 70.0, "urgency": 20.0});
    let (status, _) = send(&app, "POST", "/api/ab-tests", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/ab-tests/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analytics_report() {
    let app = app();
    let (status, _) = send(&app, "GET", "/api/analytics?days=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(
        &app,
        "POST",
        "/api/leads/lead-1/script",
        Some(serde_json::json!({"objective": "discovery"})),
    )
    .await;
    let (status, report) = send(&app, "GET", "/api/analytics?days=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["generation_failures"], 1);
}

#[test]
fn test_bundled_config_and_fixture_load() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let settings =
        lead_engine_config::load_settings_from(&root.join("config"), None).unwrap();
    assert_eq!(settings.engine.cache.expiration_minutes, 60);
    assert_eq!(settings.lead_store.fixture_path, "config/leads.yaml");

    let store = InMemoryLeadStore::from_yaml_file(root.join(&settings.lead_store.fixture_path))
        .unwrap();
    assert_eq!(store.len(), 3);
}
