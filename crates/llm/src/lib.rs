//! LLM integration for the generation backend boundary
//!
//! Features:
//! - Ollama and OpenAI-compatible chat backends (OpenAI, Azure, local servers)
//! - Transport retries with exponential backoff
//! - Prompt rendering from a structured generation request
//! - Adapter implementing the core `GenerationBackend` contract

pub mod adapter;
pub mod backend;
pub mod factory;
pub mod prompt;

pub use adapter::LlmGenerationBackend;
pub use backend::{
    FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend,
    OpenAIConfig,
};
pub use factory::{create_backend, LlmProvider};
pub use prompt::{Message, PromptBuilder, Role};

use lead_engine_core::BackendError;
use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Network failures and 5xx responses are worth retrying; 4xx are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for BackendError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => BackendError::Timeout,
            LlmError::Network(msg) => BackendError::Unavailable(msg),
            LlmError::InvalidResponse(msg) => BackendError::InvalidResponse(msg),
            LlmError::Api(msg) => BackendError::Rejected(msg),
            LlmError::ModelNotFound(model) => {
                BackendError::Rejected(format!("model not found: {}", model))
            }
            LlmError::Configuration(msg) => BackendError::Rejected(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping_preserves_retryability() {
        let timeout: BackendError = LlmError::Timeout.into();
        assert!(timeout.is_retryable());

        let network: BackendError = LlmError::Network("connection refused".into()).into();
        assert!(network.is_retryable());

        let api: BackendError = LlmError::Api("HTTP 400".into()).into();
        assert!(!api.is_retryable());
    }
}
