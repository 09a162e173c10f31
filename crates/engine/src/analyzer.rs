//! Context analysis
//!
//! The semantic judgment (profile, style, strategy, talking points) is
//! delegated to a [`GenerationBackend`]. This module owns everything around
//! it: the request, strict decoding of the reply, structural validation, the
//! personality/strategy plausibility cap, the sparse-evidence ceiling on
//! profile confidence, and the retry policy.

use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use lead_engine_config::{AnalyzerConfig, EvidenceConfig};
use lead_engine_core::{
    CommunicationStyle, Confidence, ContextAnalysis, EngineError, GenerationBackend,
    GenerationRequest, GenerationResponse, LeadContext, PersonalityProfile, ResponseSchema,
    Result, Strategy,
};

use crate::retry::{call_with_retries, RetryPolicy};
use crate::telemetry;

const ANALYSIS_INSTRUCTIONS: &str = "You are a sales psychologist. From the lead facts, \
infer the contact's personality profile and preferred communication style, recommend one \
outreach strategy, and list value drivers and likely objections ranked strongest first. \
Give 3 to 5 key talking points and any topics to avoid. Report how confident you are in \
the profile and in the recommendation as numbers from 0 to 100. Base confidence on how \
much evidence the facts actually contain.";

/// Lead facts as sent to the backend; the capture timestamp is not a fact
pub(crate) fn lead_facts(context: &LeadContext) -> serde_json::Value {
    let mut value = serde_json::to_value(context).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.remove("captured_at");
    }
    value
}

/// Cut a JSON object out of a reply that may carry code fences or prose
pub(crate) fn extract_json_object(payload: &str) -> Option<&str> {
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    (end > start).then(|| &payload[start..=end])
}

/// Wire shape of an analysis reply
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    personality_profile: PersonalityProfile,
    communication_style: CommunicationStyle,
    recommended_strategy: Strategy,
    value_drivers: Vec<String>,
    objection_patterns: Vec<String>,
    key_talking_points: Vec<String>,
    #[serde(default)]
    avoidance_topics: Vec<String>,
    profile_confidence: Confidence,
    recommendation_confidence: Confidence,
}

fn cleaned(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

/// Points kept between a capped confidence and the plausibility threshold
const PLAUSIBILITY_MARGIN: f32 = 1.0;

/// Personality -> strategies considered a poor fit
#[derive(Debug, Clone)]
pub struct PlausibilityTable {
    implausible: HashMap<PersonalityProfile, Vec<Strategy>>,
    cap: Confidence,
}

impl PlausibilityTable {
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let mut implausible = HashMap::new();
        for (profile, strategies) in &config.implausible_strategies {
            let profile: PersonalityProfile = parse_wire_name(profile)?;
            let strategies = strategies
                .iter()
                .map(|s| parse_wire_name::<Strategy>(s))
                .collect::<Result<Vec<_>>>()?;
            implausible.insert(profile, strategies);
        }
        let threshold = config.implausible_confidence_threshold;
        let cap = Confidence::new(threshold - PLAUSIBILITY_MARGIN)
            .filter(|_| threshold <= 100.0)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "implausible_confidence_threshold {} outside [1, 100]",
                    threshold
                ))
            })?;
        Ok(Self { implausible, cap })
    }

    pub fn is_plausible(&self, profile: PersonalityProfile, strategy: Strategy) -> bool {
        self.implausible
            .get(&profile)
            .map_or(true, |s| !s.contains(&strategy))
    }

    /// Largest confidence an implausible pairing may report
    pub fn cap(&self) -> Confidence {
        self.cap
    }
}

fn parse_wire_name<T: serde::de::DeserializeOwned>(name: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(name.trim().to_lowercase()))
        .map_err(|_| EngineError::Configuration(format!("unknown name '{}'", name)))
}

/// Upper bound on profile confidence given how much the context shows
///
/// Record attributes alone say nothing about behavior, so a lead without
/// conversation history stays at the cold ceiling. With history, each counted
/// conversation (more for rich ones) and each qualification or preference
/// signal raises the ceiling up to `max_ceiling`.
pub fn evidence_ceiling(context: &LeadContext, config: &EvidenceConfig) -> Confidence {
    if context.conversations.is_empty() {
        return Confidence::saturating(config.cold_ceiling);
    }

    let mut score: f32 = context
        .conversations
        .iter()
        .take(config.max_counted_conversations)
        .map(|c| {
            if c.is_rich() {
                config.per_conversation + config.rich_conversation_bonus
            } else {
                config.per_conversation
            }
        })
        .sum();

    let qualification = &context.qualification;
    let signals = [
        qualification.qualification_score.is_some(),
        qualification.interest_level.is_some(),
        qualification.decision_maker_level.is_some(),
    ];
    score += signals.iter().filter(|s| **s).count() as f32 * config.qualification_weight;

    let preferences = [
        context.preferences.contact_method.is_some(),
        context.preferences.communication_style.is_some(),
    ];
    score += preferences.iter().filter(|s| **s).count() as f32 * config.preference_weight;

    Confidence::saturating((config.cold_ceiling + score).min(config.max_ceiling))
}

/// Produces [`ContextAnalysis`] values through a generation backend
pub struct ContextAnalyzer {
    backend: Arc<dyn GenerationBackend>,
    config: AnalyzerConfig,
    plausibility: PlausibilityTable,
}

impl ContextAnalyzer {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: AnalyzerConfig) -> Result<Self> {
        let plausibility = PlausibilityTable::from_config(&config)?;
        Ok(Self {
            backend,
            config,
            plausibility,
        })
    }

    pub fn plausibility(&self) -> &PlausibilityTable {
        &self.plausibility
    }

    /// Analyze a lead context
    ///
    /// Malformed replies and transient backend failures are retried with
    /// exponential backoff. Once retries run out the error is
    /// `AnalysisUnavailable`, carrying the context for a fallback path.
    pub async fn analyze(&self, context: &LeadContext) -> Result<ContextAnalysis> {
        let started = Instant::now();
        let request = self.build_request(context);
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            initial_backoff: self.config.initial_backoff(),
            timeout: self.config.timeout(),
        };

        let result = call_with_retries(self.backend.as_ref(), &request, policy, "analysis", |r| {
            self.decode(context, r)
        })
        .await;
        telemetry::record_analysis_latency(started.elapsed());

        match result {
            Ok(analysis) => {
                tracing::info!(
                    lead_id = %context.lead_id,
                    profile = %analysis.personality_profile,
                    strategy = %analysis.recommended_strategy,
                    profile_confidence = %analysis.profile_confidence,
                    recommendation_confidence = %analysis.recommendation_confidence,
                    plausibility_capped = analysis.plausibility_capped,
                    evidence_capped = analysis.evidence_capped,
                    "Context analyzed"
                );
                Ok(analysis)
            }
            Err(exhausted) => Err(EngineError::AnalysisUnavailable {
                lead_id: context.lead_id.clone(),
                attempts: exhausted.attempts,
                reason: exhausted.reason,
                context: Box::new(context.clone()),
            }),
        }
    }

    fn build_request(&self, context: &LeadContext) -> GenerationRequest {
        let strategies = Strategy::ALL
            .iter()
            .map(|s| format!("{}: {}", s, s.description()))
            .collect::<Vec<_>>()
            .join("; ");
        let profiles = PersonalityProfile::ALL
            .iter()
            .map(|p| format!("{}: {}", p, p.description()))
            .collect::<Vec<_>>()
            .join("; ");

        GenerationRequest::new(
            ResponseSchema::ContextAnalysis,
            ANALYSIS_INSTRUCTIONS,
            lead_facts(context),
        )
        .with_semantic("personality_profiles", profiles)
        .with_semantic("strategies", strategies)
        .with_max_tokens(self.config.max_tokens)
    }

    /// Strictly decode and validate one backend reply
    fn decode(&self, context: &LeadContext, response: &GenerationResponse) -> Result<ContextAnalysis> {
        let json = extract_json_object(&response.payload)
            .ok_or_else(|| EngineError::MalformedAnalysis("no JSON object in reply".to_string()))?;
        let payload: AnalysisPayload = serde_json::from_str(json)
            .map_err(|e| EngineError::MalformedAnalysis(e.to_string()))?;

        let key_talking_points = cleaned(payload.key_talking_points);
        if key_talking_points.is_empty() {
            return Err(EngineError::MalformedAnalysis(
                "key_talking_points is empty".to_string(),
            ));
        }
        let avoidance_topics = cleaned(payload.avoidance_topics);
        let talking: HashSet<String> = key_talking_points.iter().map(|s| s.to_lowercase()).collect();
        if let Some(overlap) = avoidance_topics.iter().find(|t| talking.contains(&t.to_lowercase())) {
            return Err(EngineError::MalformedAnalysis(format!(
                "'{}' is both a talking point and an avoidance topic",
                overlap
            )));
        }

        let mut recommendation_confidence = payload.recommendation_confidence;
        let plausible = self
            .plausibility
            .is_plausible(payload.personality_profile, payload.recommended_strategy);
        if !plausible {
            tracing::debug!(
                lead_id = %context.lead_id,
                profile = %payload.personality_profile,
                strategy = %payload.recommended_strategy,
                "Implausible strategy for profile"
            );
            recommendation_confidence = recommendation_confidence.capped_at(self.plausibility.cap());
        }

        let ceiling = evidence_ceiling(context, &self.config.evidence);
        let evidence_capped = payload.profile_confidence > ceiling;
        let profile_confidence = payload.profile_confidence.capped_at(ceiling);

        Ok(ContextAnalysis {
            lead_id: context.lead_id.clone(),
            personality_profile: payload.personality_profile,
            communication_style: payload.communication_style,
            recommended_strategy: payload.recommended_strategy,
            value_drivers: cleaned(payload.value_drivers),
            objection_patterns: cleaned(payload.objection_patterns),
            key_talking_points,
            avoidance_topics,
            profile_confidence,
            recommendation_confidence,
            plausibility_capped: !plausible,
            evidence_capped,
            analyzed_at: Utc::now(),
            generated_by: self.backend.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend as Scripted;
    use chrono::Duration;
    use lead_engine_core::ConversationSummary;

    fn reply(profile: &str, strategy: &str, profile_conf: f32, rec_conf: f32) -> String {
        serde_json::json!({
            "personality_profile": profile,
            "communication_style": "business",
            "recommended_strategy": strategy,
            "value_drivers": ["cost savings", " ", "cost savings"],
            "objection_patterns": ["price"],
            "key_talking_points": ["ROI in 90 days", "fleet visibility"],
            "avoidance_topics": ["layoffs"],
            "profile_confidence": profile_conf,
            "recommendation_confidence": rec_conf,
        })
        .to_string()
    }

    fn config() -> AnalyzerConfig {
        AnalyzerConfig {
            initial_backoff_ms: 1,
            ..AnalyzerConfig::default()
        }
    }

    fn rich_context() -> LeadContext {
        let conversations = (0..5)
            .map(|i| ConversationSummary {
                id: format!("c{}", i),
                occurred_at: Utc::now() - Duration::days(i),
                duration_seconds: 600,
                sentiment: 0.5,
                engagement: 80.0,
                summary: Some("Discussed fleet costs in depth".into()),
                objections: vec!["price".into()],
                buying_signals: vec!["asked about pricing tiers".into()],
            })
            .collect();
        LeadContext::new("warm", "Dana").with_conversations(conversations)
    }

    #[tokio::test]
    async fn test_decodes_fenced_reply() {
        let fenced = format!("```json\n{}\n```", reply("analytical", "consultative", 30.0, 70.0));
        let backend = Scripted::new(&[&fenced]);
        let analyzer = ContextAnalyzer::new(backend, config()).unwrap();
        let analysis = analyzer.analyze(&rich_context()).await.unwrap();
        assert_eq!(analysis.recommended_strategy, Strategy::Consultative);
        assert_eq!(analysis.value_drivers, vec!["cost savings"]);
        assert!(!analysis.plausibility_capped);
        assert_eq!(analysis.generated_by, "scripted");
    }

    #[tokio::test]
    async fn test_implausible_pair_caps_recommendation() {
        let backend = Scripted::new(&[&reply("analytical", "urgency", 50.0, 90.0)]);
        let analyzer = ContextAnalyzer::new(backend, config()).unwrap();
        let analysis = analyzer.analyze(&rich_context()).await.unwrap();
        assert_eq!(analysis.recommended_strategy, Strategy::Urgency);
        assert_eq!(analysis.recommendation_confidence.value(), 44.0);
        assert!(analysis.recommendation_confidence.value() < 45.0);
        assert!(analysis.plausibility_capped);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_retried_then_accepted() {
        let bad = reply("driver", "direct", 150.0, 60.0);
        let good = reply("driver", "direct", 60.0, 60.0);
        let backend = Scripted::new(&[&bad, &good]);
        let analyzer = ContextAnalyzer::new(backend.clone(), config()).unwrap();
        let analysis = analyzer.analyze(&rich_context()).await.unwrap();
        assert_eq!(analysis.profile_confidence.value(), 60.0);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_strategy_exhausts_retries() {
        let bad = reply("driver", "aggressive", 60.0, 60.0);
        let backend = Scripted::new(&[&bad]);
        let analyzer = ContextAnalyzer::new(backend.clone(), config()).unwrap();
        let err = analyzer.analyze(&rich_context()).await.unwrap_err();
        match err {
            EngineError::AnalysisUnavailable {
                attempts, context, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(context.lead_id, "warm");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_avoidance_overlap_rejected() {
        let mut value: serde_json::Value =
            serde_json::from_str(&reply("amiable", "relationship", 50.0, 50.0)).unwrap();
        value["avoidance_topics"] = serde_json::json!(["Fleet Visibility"]);
        let backend = Scripted::new(&[&value.to_string()]);
        let analyzer = ContextAnalyzer::new(
            backend,
            AnalyzerConfig {
                max_retries: 0,
                ..config()
            },
        )
        .unwrap();
        let err = analyzer.analyze(&rich_context()).await.unwrap_err();
        assert!(err.to_string().contains("both a talking point"));
    }

    #[tokio::test]
    async fn test_cold_lead_capped_below_rich_lead() {
        let backend = Scripted::new(&[&reply("expressive", "social_proof", 90.0, 80.0)]);
        let analyzer = ContextAnalyzer::new(backend, config()).unwrap();

        let cold = analyzer
            .analyze(&LeadContext::new("cold", "Sam"))
            .await
            .unwrap();
        let warm = analyzer.analyze(&rich_context()).await.unwrap();

        assert!(cold.profile_confidence.value() <= 40.0);
        assert!(cold.evidence_capped);
        assert!(warm.profile_confidence.value() >= cold.profile_confidence.value() + 30.0);
    }

    #[test]
    fn test_evidence_ceiling_grows_with_history() {
        let evidence = EvidenceConfig::default();
        let cold = evidence_ceiling(&LeadContext::new("c", "Sam"), &evidence);
        assert_eq!(cold.value(), evidence.cold_ceiling);
        let rich = evidence_ceiling(&rich_context(), &evidence);
        assert_eq!(rich.value(), evidence.max_ceiling);
    }

    #[test]
    fn test_plausibility_table_rejects_unknown_names() {
        let mut cfg = AnalyzerConfig::default();
        cfg.implausible_strategies
            .insert("analytical".into(), vec!["shouting".into()]);
        assert!(matches!(
            PlausibilityTable::from_config(&cfg),
            Err(EngineError::Configuration(_))
        ));

        let table = PlausibilityTable::from_config(&AnalyzerConfig::default()).unwrap();
        assert!(!table.is_plausible(PersonalityProfile::Amiable, Strategy::Direct));
        assert!(table.is_plausible(PersonalityProfile::Amiable, Strategy::Relationship));
    }
}
