//! Error taxonomy for the engine
//!
//! `NotFound` is fatal to a request and never retried. `MalformedAnalysis` /
//! `MalformedScript` are retried locally by the analyzer/generator and only
//! surface once retries are exhausted, as `AnalysisUnavailable` /
//! `ScriptUnavailable` carrying the lead context so the caller can fall back
//! to a generic path. A cache miss is not an error.

use thiserror::Error;

use crate::experiment::TestStatus;
use crate::lead::LeadContext;

/// Engine result alias
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by a generation backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend request timed out")]
    Timeout,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Backend returned invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout | BackendError::Unavailable(_) | BackendError::InvalidResponse(_)
        )
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Lead not found: {0}")]
    NotFound(String),

    #[error("Malformed analysis: {0}")]
    MalformedAnalysis(String),

    #[error("Malformed script: {0}")]
    MalformedScript(String),

    #[error("Analysis unavailable for lead {lead_id} after {attempts} attempts: {reason}")]
    AnalysisUnavailable {
        lead_id: String,
        attempts: u32,
        reason: String,
        context: Box<LeadContext>,
    },

    #[error("Script unavailable for lead {lead_id} after {attempts} attempts: {reason}")]
    ScriptUnavailable {
        lead_id: String,
        attempts: u32,
        reason: String,
        context: Box<LeadContext>,
    },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Invalid experiment: {0}")]
    InvalidExperiment(String),

    #[error("Invalid transition for test {test_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        test_id: String,
        from: TestStatus,
        to: TestStatus,
    },

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Whether the analyzer/generator should retry after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::MalformedAnalysis(_) | EngineError::MalformedScript(_) => true,
            EngineError::Backend(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Lead context attached to an exhausted-retries failure
    pub fn fallback_context(&self) -> Option<&LeadContext> {
        match self {
            EngineError::AnalysisUnavailable { context, .. }
            | EngineError::ScriptUnavailable { context, .. } => Some(context),
            _ => None,
        }
    }
}
