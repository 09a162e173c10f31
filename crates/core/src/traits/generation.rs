//! Text generation backend contract
//!
//! A backend receives system instructions, lead facts, strategy and objective
//! semantics and optional length constraints, and returns a raw payload the
//! caller decodes strictly against the requested schema.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BackendError;

/// Structured payload the backend is asked to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSchema {
    ContextAnalysis,
    PersonalizedScript,
}

impl ResponseSchema {
    /// JSON shape description included in the prompt
    pub fn shape(&self) -> &'static str {
        match self {
            ResponseSchema::ContextAnalysis => {
                r#"{"personality_profile": "analytical|driver|expressive|amiable", "communication_style": "formal|casual|technical|business", "recommended_strategy": "consultative|direct|educational|relationship|urgency|social_proof", "value_drivers": [string], "objection_patterns": [string], "key_talking_points": [string, 3-5 items], "avoidance_topics": [string], "profile_confidence": 0-100, "recommendation_confidence": 0-100}"#
            }
            ResponseSchema::PersonalizedScript => {
                r#"{"estimated_duration_seconds": int, "opening": SECTION, "discovery": SECTION, "presentation": SECTION, "objection_handling": SECTION (only when requested), "closing": SECTION} where SECTION = {"content": string with {{token}} placeholders, "key_points": [string], "estimated_duration_seconds": int > 0, "personalized_elements": [{"element_type": "name|company|industry|role|product|pain_point|value_driver|social_proof|previous_interaction|custom", "placeholder": "{{token}}", "value": string, "confidence": 0-100, "provenance": "lead_data|conversation_history|industry_knowledge|ai_inference"}]}"#
            }
        }
    }
}

/// Length and content toggles for script generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConstraints {
    pub max_total_words: u32,
    pub include_objection_handling: bool,
    pub include_social_proof: bool,
}

/// One request to the generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub schema: ResponseSchema,
    pub system_instructions: String,
    /// Lead facts as structured JSON
    pub lead_facts: serde_json::Value,
    /// Named semantic hints, e.g. `strategy` and `objective` descriptions
    #[serde(default)]
    pub semantics: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<GenerationConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl GenerationRequest {
    pub fn new(
        schema: ResponseSchema,
        system_instructions: impl Into<String>,
        lead_facts: serde_json::Value,
    ) -> Self {
        Self {
            schema,
            system_instructions: system_instructions.into(),
            lead_facts,
            semantics: BTreeMap::new(),
            constraints: None,
            max_tokens: None,
        }
    }

    pub fn with_semantic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.semantics.insert(key.into(), value.into());
        self
    }

    pub fn with_constraints(mut self, constraints: GenerationConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Raw backend reply, not yet validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub payload: String,
    pub model: String,
    pub latency_ms: u64,
}

/// Pluggable text generation provider
///
/// Implementations must be safe to call concurrently. The engine applies its
/// own hard timeout around every call, so a backend need not enforce one.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationResponse, BackendError>;

    /// Identifier recorded as `generated_by` on produced artifacts
    fn name(&self) -> &str;

    async fn is_available(&self) -> bool {
        true
    }
}
