//! Shared fixtures for unit tests

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use lead_engine_core::{
    BackendError, CommunicationStyle, Confidence, ContextAnalysis, GenerationBackend,
    GenerationRequest, GenerationResponse, PersonalityProfile, Strategy,
};

/// Replays canned payloads in order, repeating the last one
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        self.requests.lock().push(request.clone());
        let mut replies = self.replies.lock();
        let payload = if replies.len() > 1 {
            replies.pop_front().unwrap_or_default()
        } else {
            replies.front().cloned().unwrap_or_default()
        };
        Ok(GenerationResponse {
            payload,
            model: "scripted".into(),
            latency_ms: 1,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub(crate) fn analysis(lead_id: &str, strategy: Strategy, confidence: f32) -> ContextAnalysis {
    ContextAnalysis {
        lead_id: lead_id.to_string(),
        personality_profile: PersonalityProfile::Analytical,
        communication_style: CommunicationStyle::Business,
        recommended_strategy: strategy,
        value_drivers: vec!["cost savings".into()],
        objection_patterns: vec!["price".into()],
        key_talking_points: vec!["ROI in 90 days".into()],
        avoidance_topics: vec![],
        profile_confidence: Confidence::saturating(confidence),
        recommendation_confidence: Confidence::saturating(confidence),
        plausibility_capped: false,
        evidence_capped: false,
        analyzed_at: Utc::now(),
        generated_by: "test".into(),
    }
}

fn section(content: &str, seconds: u32, elements: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "content": content,
        "key_points": ["keep it short"],
        "estimated_duration_seconds": seconds,
        "personalized_elements": elements,
    })
}

/// Well-formed script reply; objection handling included when asked
pub(crate) fn script_reply(with_objection_handling: bool) -> serde_json::Value {
    let mut reply = serde_json::json!({
        "estimated_duration_seconds": 240,
        "opening": section(
            "Hi {{lead_name}}, this is Alex calling about {{pain_point}}.",
            30,
            serde_json::json!([
                {"element_type": "name", "placeholder": "{{lead_name}}", "value": "Dana",
                 "confidence": 100, "provenance": "lead_data"},
                {"element_type": "pain_point", "placeholder": "pain_point", "value": "rising fuel costs",
                 "confidence": 100, "provenance": "ai_inference"}
            ]),
        ),
        "discovery": section("How are you tracking routes at {{company}} today?", 60, serde_json::json!([])),
        "presentation": section("We cut idle time by a fifth for fleets like yours.", 60, serde_json::json!([])),
        "closing": section("Could we book thirty minutes on Thursday?", 30, serde_json::json!([])),
    });
    if with_objection_handling {
        reply["objection_handling"] =
            section("If price is a concern, the pilot is free for a month.", 60, serde_json::json!([]));
    }
    reply
}
