//! Bridges an [`LlmBackend`] to the core [`GenerationBackend`] contract

use async_trait::async_trait;
use std::sync::Arc;

use lead_engine_core::{BackendError, GenerationBackend, GenerationRequest, GenerationResponse};

use crate::backend::LlmBackend;
use crate::prompt::PromptBuilder;

/// Adapter that renders generation requests into chat prompts
///
/// ```ignore
/// let backend = OllamaBackend::new(LlmConfig::default())?;
/// let generation: Arc<dyn GenerationBackend> = Arc::new(LlmGenerationBackend::new(backend));
/// ```
pub struct LlmGenerationBackend {
    backend: Arc<dyn LlmBackend>,
    name: String,
}

impl LlmGenerationBackend {
    pub fn new<B: LlmBackend + 'static>(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn LlmBackend>) -> Self {
        let name = format!("llm:{}", backend.model_name());
        Self { backend, name }
    }
}

#[async_trait]
impl GenerationBackend for LlmGenerationBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        let messages = PromptBuilder::for_request(request).build();

        let result = self.backend.generate(&messages, request.max_tokens).await?;
        if result.text.trim().is_empty() {
            return Err(BackendError::InvalidResponse("empty completion".to_string()));
        }

        tracing::debug!(
            model = self.backend.model_name(),
            tokens = result.tokens,
            latency_ms = result.total_time_ms,
            schema = ?request.schema,
            "Generation completed"
        );

        Ok(GenerationResponse {
            payload: result.text,
            model: self.backend.model_name().to_string(),
            latency_ms: result.total_time_ms,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }
}
