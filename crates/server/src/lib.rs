//! Lead Engine Server
//!
//! HTTP endpoints for lead analysis, script personalization, usage and
//! outcome reporting, performance analytics and A/B test administration.

pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler, record_request, track_requests};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use lead_engine_core::EngineError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        (&err).into()
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) | EngineError::ExperimentNotFound(_) => {
                ServerError::NotFound(err.to_string())
            }
            EngineError::InvalidExperiment(_) => ServerError::InvalidRequest(err.to_string()),
            EngineError::InvalidTransition { .. } => ServerError::Conflict(err.to_string()),
            EngineError::DeadlineExceeded => ServerError::DeadlineExceeded,
            EngineError::AnalysisUnavailable { .. }
            | EngineError::ScriptUnavailable { .. }
            | EngineError::Backend(_) => ServerError::Unavailable(err.to_string()),
            EngineError::MalformedAnalysis(_)
            | EngineError::MalformedScript(_)
            | EngineError::Store(_)
            | EngineError::Configuration(_) => ServerError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_engine_core::TestStatus;

    #[test]
    fn test_engine_error_status_mapping() {
        let cases = [
            (EngineError::NotFound("l1".into()), StatusCode::NOT_FOUND),
            (
                EngineError::ExperimentNotFound("t1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                EngineError::InvalidExperiment("split".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::InvalidTransition {
                    test_id: "t1".into(),
                    from: TestStatus::Completed,
                    to: TestStatus::Running,
                },
                StatusCode::CONFLICT,
            ),
            (EngineError::DeadlineExceeded, StatusCode::GATEWAY_TIMEOUT),
            (
                EngineError::Store("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(StatusCode::from(ServerError::from(err)), expected);
        }
    }
}
