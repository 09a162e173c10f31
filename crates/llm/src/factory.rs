//! Backend selection from settings
//!
//! ```ignore
//! let settings = load_settings(None)?;
//! let backend = create_backend(&settings.llm)?;
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use lead_engine_config::LlmSettings;
use lead_engine_core::GenerationBackend;

use crate::adapter::LlmGenerationBackend;
use crate::backend::{LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig};
use crate::LlmError;

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Local models via Ollama
    #[default]
    Ollama,
    OpenAI,
    AzureOpenAI,
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" | "local" => Ok(LlmProvider::Ollama),
            "openai" | "gpt" => Ok(LlmProvider::OpenAI),
            "azure" | "azure-openai" => Ok(LlmProvider::AzureOpenAI),
            other => Err(LlmError::Configuration(format!("Unknown provider '{}'", other))),
        }
    }
}

/// Client-level retries; the engine retries each call with its own budget
/// and per-attempt deadline, so a client never retries underneath it
const CLIENT_RETRIES: u32 = 0;

fn ollama_config(settings: &LlmSettings) -> LlmConfig {
    let defaults = LlmConfig::default();
    LlmConfig {
        model: settings.model.clone(),
        endpoint: settings.endpoint.clone().unwrap_or(defaults.endpoint),
        temperature: settings.temperature,
        timeout: Duration::from_secs(settings.timeout_seconds),
        max_retries: CLIENT_RETRIES,
        ..defaults
    }
}

fn openai_config(settings: &LlmSettings, provider: LlmProvider) -> Result<OpenAIConfig, LlmError> {
    let timeout = Duration::from_secs(settings.timeout_seconds);
    let config = match provider {
        LlmProvider::AzureOpenAI => {
            let endpoint = settings.endpoint.clone().ok_or_else(|| {
                LlmError::Configuration("Azure OpenAI requires llm.endpoint".to_string())
            })?;
            let api_version = settings
                .azure_api_version
                .clone()
                .unwrap_or_else(|| "2024-02-01".to_string());
            OpenAIConfig {
                timeout,
                max_retries: CLIENT_RETRIES,
                temperature: settings.temperature,
                ..OpenAIConfig::azure(
                    endpoint,
                    settings.api_key.clone().unwrap_or_default(),
                    settings.model.clone(),
                    api_version,
                )
            }
        }
        _ => {
            let defaults = OpenAIConfig::default();
            OpenAIConfig {
                endpoint: settings.endpoint.clone().unwrap_or(defaults.endpoint),
                api_key: settings.api_key.clone().unwrap_or_default(),
                model: settings.model.clone(),
                temperature: settings.temperature,
                timeout,
                max_retries: CLIENT_RETRIES,
                organization: settings.organization.clone(),
                ..Default::default()
            }
        }
    };
    Ok(config)
}

/// Build the generation backend described by `settings`
pub fn create_backend(settings: &LlmSettings) -> Result<Arc<dyn GenerationBackend>, LlmError> {
    let provider: LlmProvider = settings.provider.parse()?;

    let backend: Arc<dyn GenerationBackend> = match provider {
        LlmProvider::Ollama => Arc::new(LlmGenerationBackend::new(OllamaBackend::new(
            ollama_config(settings),
        )?)),
        LlmProvider::OpenAI | LlmProvider::AzureOpenAI => Arc::new(LlmGenerationBackend::new(
            OpenAIBackend::new(openai_config(settings, provider)?)?,
        )),
    };

    tracing::info!(
        provider = ?provider,
        model = %settings.model,
        "Generation backend created"
    );
    Ok(backend)
}
