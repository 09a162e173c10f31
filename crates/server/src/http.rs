//! HTTP Endpoints
//!
//! REST API over the personalization engine.

use axum::{
    extract::{Json, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use lead_engine::{AnalyzedLead, NewABTest, PersonalizationOutcome, PersonalizationRequest};
use lead_engine_core::{
    ABTest, ABTestResults, CallObjective, CallOutcome, PerformanceAnalytics, ReportingPeriod,
    ScriptUsage, Strategy,
};

use crate::metrics::{metrics_handler, track_requests};
use crate::state::AppState;
use crate::ServerError;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );
    let timeout = Duration::from_secs(state.settings.server.timeout_seconds);

    Router::new()
        // Lead analysis and scripts
        .route("/api/leads/:id/analysis", post(analyze_lead))
        .route("/api/leads/:id/script", post(generate_script))
        .route("/api/scripts/events", post(record_script_event))
        // Analytics
        .route("/api/analytics", get(performance_analytics))
        // A/B tests
        .route("/api/ab-tests", post(create_test).get(list_tests))
        .route("/api/ab-tests/:id", get(get_test))
        .route("/api/ab-tests/:id/start", post(start_test))
        .route("/api/ab-tests/:id/pause", post(pause_test))
        .route("/api/ab-tests/:id/resume", post(resume_test))
        .route("/api/ab-tests/:id/complete", post(complete_test))
        .route("/api/ab-tests/:id/observations", post(record_observation))
        .route("/api/ab-tests/:id/assignments", get(list_assignments))
        .route("/api/ab-tests/:id/results", get(test_results))
        // Health and metrics
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let engine_state = state.engine.state();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.settings.environment,
        "cached_analyses": engine_state.cache.len(),
        "ab_tests": engine_state.experiments.list_tests().len(),
        "analytics_dropped_events": engine_state.analytics.dropped_events(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisParams {
    /// Bypass and replace any cached analysis
    #[serde(default)]
    refresh: bool,
}

/// POST /api/leads/:id/analysis
async fn analyze_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    Query(params): Query<AnalysisParams>,
) -> Result<Json<AnalyzedLead>, ServerError> {
    let analyzed = if params.refresh {
        state.engine.refresh_analysis(&lead_id).await?
    } else {
        state.engine.analyze_lead(&lead_id).await?
    };
    Ok(Json(analyzed))
}

/// Script request body
#[derive(Debug, Deserialize)]
struct ScriptRequest {
    objective: CallObjective,
    #[serde(default)]
    strategy: Option<Strategy>,
    #[serde(default)]
    include_objection_handling: Option<bool>,
    #[serde(default)]
    include_social_proof: Option<bool>,
    #[serde(default)]
    max_total_words: Option<u32>,
    /// Overrides `server.script_deadline_ms`; 0 waits indefinitely
    #[serde(default)]
    deadline_ms: Option<u64>,
}

impl ScriptRequest {
    fn into_request(self, lead_id: String, default_deadline_ms: u64) -> PersonalizationRequest {
        let mut request = PersonalizationRequest::new(lead_id, self.objective);
        request.strategy = self.strategy;
        request.include_objection_handling = self.include_objection_handling;
        request.include_social_proof = self.include_social_proof;
        request.max_total_words = self.max_total_words;
        match self.deadline_ms.unwrap_or(default_deadline_ms) {
            0 => request,
            ms => request.with_deadline(Duration::from_millis(ms)),
        }
    }
}

/// POST /api/leads/:id/script
///
/// A fallback script is still a 200 response; `success` tells the caller
/// whether it is personalized.
async fn generate_script(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    Json(body): Json<ScriptRequest>,
) -> Result<Json<PersonalizationOutcome>, ServerError> {
    if body.max_total_words == Some(0) {
        return Err(ServerError::InvalidRequest(
            "max_total_words must be positive".to_string(),
        ));
    }
    let request = body.into_request(lead_id, state.settings.server.script_deadline_ms);
    let outcome = state.engine.personalize(request).await?;
    Ok(Json(outcome))
}

/// Usage or outcome report for a delivered script
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    Used {
        usage: ScriptUsage,
    },
    Outcome {
        usage: ScriptUsage,
        /// Omitted while the outcome is still unknown
        #[serde(default)]
        outcome: Option<CallOutcome>,
    },
}

/// POST /api/scripts/events
async fn record_script_event(
    State(state): State<AppState>,
    Json(event): Json<ScriptEvent>,
) -> Result<StatusCode, ServerError> {
    match event {
        ScriptEvent::Used { usage } => state.engine.record_script_used(&usage),
        ScriptEvent::Outcome { usage, outcome } => {
            state.engine.record_outcome(&usage, outcome)?
        }
    }
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsParams {
    days: Option<i64>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl AnalyticsParams {
    fn period(&self) -> Result<Option<ReportingPeriod>, ServerError> {
        match (self.start, self.end, self.days) {
            (Some(start), Some(end), None) if start < end => {
                Ok(Some(ReportingPeriod::new(start, end)))
            }
            (Some(_), Some(_), None) => Err(ServerError::InvalidRequest(
                "start must be before end".to_string(),
            )),
            (None, None, Some(days)) if days > 0 => Ok(Some(ReportingPeriod::last_days(days))),
            (None, None, Some(_)) => Err(ServerError::InvalidRequest(
                "days must be positive".to_string(),
            )),
            (None, None, None) => Ok(None),
            _ => Err(ServerError::InvalidRequest(
                "use either days or both start and end".to_string(),
            )),
        }
    }
}

/// GET /api/analytics
async fn performance_analytics(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> Result<Json<PerformanceAnalytics>, ServerError> {
    let analytics = &state.engine.state().analytics;
    let report = match params.period()? {
        Some(period) => analytics.summarize(&period).await?,
        None => analytics.summarize_recent().await?,
    };
    Ok(Json(report))
}

/// POST /api/ab-tests
async fn create_test(
    State(state): State<AppState>,
    Json(new): Json<NewABTest>,
) -> Result<(StatusCode, Json<ABTest>), ServerError> {
    let test = state.engine.state().experiments.create_test(new)?;
    Ok((StatusCode::CREATED, Json(test)))
}

/// GET /api/ab-tests
async fn list_tests(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tests = state.engine.state().experiments.list_tests();
    Json(serde_json::json!({
        "count": tests.len(),
        "tests": tests,
    }))
}

/// GET /api/ab-tests/:id
async fn get_test(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<ABTest>, ServerError> {
    Ok(Json(state.engine.state().experiments.get_test(&test_id)?))
}

async fn start_test(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<ABTest>, ServerError> {
    Ok(Json(state.engine.state().experiments.start_test(&test_id)?))
}

async fn pause_test(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<ABTest>, ServerError> {
    Ok(Json(state.engine.state().experiments.pause_test(&test_id)?))
}

async fn resume_test(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<ABTest>, ServerError> {
    Ok(Json(state.engine.state().experiments.resume_test(&test_id)?))
}

async fn complete_test(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<ABTest>, ServerError> {
    Ok(Json(state.engine.state().experiments.complete_test(&test_id)?))
}

#[derive(Debug, Deserialize)]
struct ObservationRequest {
    lead_id: String,
    value: f64,
}

/// POST /api/ab-tests/:id/observations
async fn record_observation(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(body): Json<ObservationRequest>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .state()
        .experiments
        .record_observation(&test_id, &body.lead_id, body.value)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/ab-tests/:id/assignments
async fn list_assignments(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let records = state.engine.state().experiments.assignments(&test_id)?;
    Ok(Json(serde_json::json!({
        "count": records.len(),
        "assignments": records,
    })))
}

/// GET /api/ab-tests/:id/results
async fn test_results(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<ABTestResults>, ServerError> {
    Ok(Json(state.engine.state().experiments.results(&test_id)?))
}
