//! Prompt building
//!
//! Renders a structured [`GenerationRequest`] into chat messages: one system
//! message carrying the instructions and the response shape, one user message
//! carrying lead facts, semantic guidance and constraints.

use lead_engine_core::GenerationRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Prompt builder
#[derive(Debug, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages for a generation request
    pub fn for_request(request: &GenerationRequest) -> Self {
        let system = format!(
            "{}\n\n## Response Format\nRespond with a single JSON object and nothing else. \
             Use exactly these fields and enumerated values:\n{}",
            request.system_instructions.trim(),
            request.schema.shape()
        );

        let facts = serde_json::to_string_pretty(&request.lead_facts)
            .unwrap_or_else(|_| request.lead_facts.to_string());
        let mut user = format!("## Lead Facts\n{}", facts);

        if !request.semantics.is_empty() {
            user.push_str("\n\n## Guidance");
            for (key, value) in &request.semantics {
                user.push_str(&format!("\n- {}: {}", key, value));
            }
        }

        if let Some(constraints) = request.constraints {
            user.push_str(&format!(
                "\n\n## Constraints\n- Maximum total words across all sections: {}\n- Include objection_handling section: {}\n- Include social proof references: {}",
                constraints.max_total_words,
                if constraints.include_objection_handling { "yes" } else { "no, omit the field entirely" },
                if constraints.include_social_proof { "yes" } else { "no" },
            ));
        }

        Self::new().system(system).user_message(&user)
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    pub fn user_message(mut self, message: &str) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Estimate token count, about four graphemes per token
    pub fn estimate_tokens(&self) -> usize {
        use unicode_segmentation::UnicodeSegmentation;

        self.messages
            .iter()
            .map(|m| m.content.graphemes(true).count().max(1) / 4)
            .sum()
    }
}
