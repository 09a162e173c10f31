//! Personalized script generation
//!
//! Strategy precedence is explicit caller choice, then an active experiment
//! variant, then the analysis recommendation. The backend drafts section text
//! and element substitutions; the generator enforces placeholder closure,
//! resolves tokens it can answer from lead data itself, and attaches
//! warnings for issues that do not invalidate the script.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use lead_engine_config::ScriptConfig;
use lead_engine_core::script::normalize_placeholder;
use lead_engine_core::{
    placeholder_tokens, CallObjective, Confidence, ContextAnalysis, ElementType, EngineError,
    GenerationBackend, GenerationConstraints, GenerationRequest, GenerationResponse, LeadContext,
    PersonalizedElement, PersonalizedScript, Provenance, ResponseSchema, Result, ScriptSection,
    ScriptSections, ScriptWarning, SectionKind, Strategy, StrategySource,
};

use crate::analyzer::{extract_json_object, lead_facts};
use crate::experiment::VariantAssignment;
use crate::retry::{call_with_retries, RetryPolicy};
use crate::telemetry;

const SCRIPT_INSTRUCTIONS: &str = "You write outbound sales call scripts. Write the \
sections in the requested order using the given strategy and objective. Use {{token}} \
placeholders for lead-specific facts and list every placeholder you use, exactly once per \
section, as a personalized element with its value, a 0-100 confidence and its provenance. \
Inferred values never get confidence 100. Keep the whole script within the word budget.";

/// Highest confidence an inferred element may carry
const MAX_INFERRED_CONFIDENCE: f32 = 99.0;

/// Per-request generation options
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOptions {
    pub objective: CallObjective,
    /// Forced strategy; wins over experiments and the recommendation
    pub strategy: Option<Strategy>,
    pub include_objection_handling: Option<bool>,
    pub include_social_proof: Option<bool>,
    pub max_total_words: Option<u32>,
}

impl ScriptOptions {
    pub fn new(objective: CallObjective) -> Self {
        Self {
            objective,
            strategy: None,
            include_objection_handling: None,
            include_social_proof: None,
            max_total_words: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_objection_handling(mut self, include: bool) -> Self {
        self.include_objection_handling = Some(include);
        self
    }

    pub fn with_social_proof(mut self, include: bool) -> Self {
        self.include_social_proof = Some(include);
        self
    }

    pub fn with_max_total_words(mut self, words: u32) -> Self {
        self.max_total_words = Some(words);
        self
    }
}

/// Pick the strategy for a script and record where it came from
pub fn resolve_strategy(
    explicit: Option<Strategy>,
    assignment: Option<&VariantAssignment>,
    analysis: &ContextAnalysis,
) -> (Strategy, StrategySource) {
    if let Some(strategy) = explicit {
        return (strategy, StrategySource::Explicit);
    }
    if let Some(assignment) = assignment {
        return (
            assignment.strategy,
            StrategySource::Experiment {
                test_id: assignment.test_id.clone(),
                variant_id: assignment.variant_id.clone(),
            },
        );
    }
    (analysis.recommended_strategy, StrategySource::Recommendation)
}

#[derive(Debug, Deserialize)]
struct SectionPayload {
    content: String,
    #[serde(default)]
    key_points: Vec<String>,
    estimated_duration_seconds: u32,
    #[serde(default)]
    personalized_elements: Vec<PersonalizedElement>,
}

#[derive(Debug, Deserialize)]
struct ScriptPayload {
    #[serde(default)]
    estimated_duration_seconds: u32,
    opening: SectionPayload,
    discovery: SectionPayload,
    presentation: SectionPayload,
    #[serde(default)]
    objection_handling: Option<SectionPayload>,
    closing: SectionPayload,
}

/// Lead facts the generator can substitute without the backend
struct KnownFacts(Vec<(&'static str, ElementType, String)>);

impl KnownFacts {
    fn from_context(context: &LeadContext) -> Self {
        let mut facts = vec![("lead_name", ElementType::Name, context.name.clone())];
        if let Some(first) = context.name.split_whitespace().next() {
            facts.push(("first_name", ElementType::Name, first.to_string()));
        }
        let optional = [
            ("company", ElementType::Company, context.company.clone()),
            ("industry", ElementType::Industry, context.industry.clone()),
            ("role", ElementType::Role, context.role.clone()),
            (
                "product_name",
                ElementType::Product,
                context.campaign.as_ref().and_then(|c| c.product_name.clone()),
            ),
            (
                "campaign_name",
                ElementType::Custom,
                context.campaign.as_ref().map(|c| c.campaign_name.clone()),
            ),
        ];
        for (token, element_type, value) in optional {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                facts.push((token, element_type, value));
            }
        }
        Self(facts)
    }

    fn resolve(&self, placeholder: &str) -> Option<PersonalizedElement> {
        self.0
            .iter()
            .find(|(token, _, _)| normalize_placeholder(token) == placeholder)
            .map(|(token, element_type, value)| {
                PersonalizedElement::new(
                    *element_type,
                    token,
                    value.clone(),
                    Confidence::MAX,
                    Provenance::LeadData,
                )
            })
    }

    fn tokens(&self) -> Vec<String> {
        self.0.iter().map(|(t, _, _)| normalize_placeholder(t)).collect()
    }
}

/// Resolved generation toggles
#[derive(Debug, Clone, Copy)]
struct Toggles {
    include_objection_handling: bool,
    include_social_proof: bool,
    max_total_words: u32,
}

/// Generates [`PersonalizedScript`] values through a generation backend
pub struct ScriptGenerator {
    backend: Arc<dyn GenerationBackend>,
    config: ScriptConfig,
}

impl ScriptGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: ScriptConfig) -> Self {
        Self { backend, config }
    }

    /// Generate a script for one (lead, objective, strategy)
    ///
    /// Toggles resolve as caller option, then experiment variant, then
    /// configuration. Malformed drafts are retried; once retries run out the
    /// error is `ScriptUnavailable`, carrying the context for a fallback.
    pub async fn generate(
        &self,
        context: &LeadContext,
        analysis: &ContextAnalysis,
        options: &ScriptOptions,
        assignment: Option<&VariantAssignment>,
    ) -> Result<PersonalizedScript> {
        let started = Instant::now();
        let (strategy, source) = resolve_strategy(options.strategy, assignment, analysis);
        let toggles = Toggles {
            include_objection_handling: options
                .include_objection_handling
                .or(assignment.and_then(|a| a.include_objection_handling))
                .unwrap_or(self.config.include_objection_handling),
            include_social_proof: options
                .include_social_proof
                .or(assignment.and_then(|a| a.include_social_proof))
                .unwrap_or(self.config.include_social_proof),
            max_total_words: options.max_total_words.unwrap_or(self.config.max_total_words),
        };
        let facts = KnownFacts::from_context(context);
        let request = self.build_request(context, analysis, options.objective, strategy, toggles, &facts);
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            initial_backoff: self.config.initial_backoff(),
            timeout: self.config.timeout(),
        };

        let result = call_with_retries(self.backend.as_ref(), &request, policy, "script", |r| {
            decode_sections(r, toggles, &facts)
        })
        .await;
        telemetry::record_script_latency(started.elapsed());

        let (headline, sections) = result.map_err(|exhausted| EngineError::ScriptUnavailable {
            lead_id: context.lead_id.clone(),
            attempts: exhausted.attempts,
            reason: exhausted.reason,
            context: Box::new(context.clone()),
        })?;

        let section_total = sections.total_duration_seconds();
        let headline = if headline == 0 { section_total } else { headline };
        let warnings = self.warnings(analysis, options.objective, strategy, &source, headline, &sections, toggles);

        let script = PersonalizedScript {
            id: Uuid::new_v4().to_string(),
            version: 1,
            parent_id: None,
            lead_id: context.lead_id.clone(),
            objective: options.objective,
            strategy,
            strategy_source: source,
            sections,
            estimated_duration_seconds: headline,
            section_duration_seconds: section_total,
            warnings,
            is_fallback: false,
            created_at: Utc::now(),
            generated_by: self.backend.name().to_string(),
        };

        tracing::info!(
            lead_id = %script.lead_id,
            script_id = %script.id,
            objective = %script.objective,
            strategy = %script.strategy,
            source = ?script.strategy_source,
            warnings = script.warnings.len(),
            "Script generated"
        );
        Ok(script)
    }

    fn build_request(
        &self,
        context: &LeadContext,
        analysis: &ContextAnalysis,
        objective: CallObjective,
        strategy: Strategy,
        toggles: Toggles,
        facts: &KnownFacts,
    ) -> GenerationRequest {
        let lead_facts = serde_json::json!({
            "lead": lead_facts(context),
            "profile": {
                "personality_profile": analysis.personality_profile,
                "communication_style": analysis.communication_style,
                "value_drivers": analysis.value_drivers,
                "objection_patterns": analysis.objection_patterns,
                "key_talking_points": analysis.key_talking_points,
                "avoidance_topics": analysis.avoidance_topics,
            },
        });

        GenerationRequest::new(ResponseSchema::PersonalizedScript, SCRIPT_INSTRUCTIONS, lead_facts)
            .with_semantic("strategy", format!("{}: {}", strategy, strategy.description()))
            .with_semantic("objective", format!("{}: {}", objective, objective.description()))
            .with_semantic(
                "communication_style",
                analysis.communication_style.as_str().to_string(),
            )
            .with_semantic("known_placeholders", facts.tokens().join(", "))
            .with_constraints(GenerationConstraints {
                max_total_words: toggles.max_total_words,
                include_objection_handling: toggles.include_objection_handling,
                include_social_proof: toggles.include_social_proof,
            })
            .with_max_tokens(self.config.max_tokens)
    }

    #[allow(clippy::too_many_arguments)]
    fn warnings(
        &self,
        analysis: &ContextAnalysis,
        objective: CallObjective,
        strategy: Strategy,
        source: &StrategySource,
        headline: u32,
        sections: &ScriptSections,
        toggles: Toggles,
    ) -> Vec<ScriptWarning> {
        let mut warnings = Vec::new();

        let section_total = sections.total_duration_seconds();
        let gap = (headline as f32 - section_total as f32).abs();
        if section_total > 0 && gap / section_total as f32 > self.config.duration_tolerance {
            warnings.push(ScriptWarning::DurationMismatch {
                headline_seconds: headline,
                section_total_seconds: section_total,
            });
        }

        let confidence = analysis.overall_confidence().value();
        if objective == CallObjective::Closing && confidence < self.config.min_closing_confidence {
            tracing::warn!(
                lead_id = %analysis.lead_id,
                confidence,
                minimum = self.config.min_closing_confidence,
                "Closing script built on low-confidence analysis"
            );
            warnings.push(ScriptWarning::LowAnalysisConfidence {
                confidence,
                minimum: self.config.min_closing_confidence,
            });
        }

        let words: usize = sections
            .in_order()
            .iter()
            .map(|s| s.rendered().unicode_words().count())
            .sum();
        if words > toggles.max_total_words as usize {
            warnings.push(ScriptWarning::ExceedsWordBudget {
                words,
                budget: toggles.max_total_words,
            });
        }

        if *source == StrategySource::Recommendation
            && analysis.plausibility_capped
            && strategy == analysis.recommended_strategy
        {
            warnings.push(ScriptWarning::ImplausibleStrategy { strategy });
        }

        warnings
    }
}

/// Strictly decode a script draft into validated sections
fn decode_sections(
    response: &GenerationResponse,
    toggles: Toggles,
    facts: &KnownFacts,
) -> Result<(u32, ScriptSections)> {
    let json = extract_json_object(&response.payload)
        .ok_or_else(|| EngineError::MalformedScript("no JSON object in reply".to_string()))?;
    let payload: ScriptPayload =
        serde_json::from_str(json).map_err(|e| EngineError::MalformedScript(e.to_string()))?;

    let objection_handling = if toggles.include_objection_handling {
        let section = payload.objection_handling.ok_or_else(|| {
            EngineError::MalformedScript("objection_handling section missing".to_string())
        })?;
        Some(finish_section(SectionKind::ObjectionHandling, section, facts)?)
    } else {
        None
    };

    let sections = ScriptSections {
        opening: finish_section(SectionKind::Opening, payload.opening, facts)?,
        discovery: finish_section(SectionKind::Discovery, payload.discovery, facts)?,
        presentation: finish_section(SectionKind::Presentation, payload.presentation, facts)?,
        objection_handling,
        closing: finish_section(SectionKind::Closing, payload.closing, facts)?,
    };

    if !toggles.include_social_proof {
        let uses_social_proof = sections
            .in_order()
            .iter()
            .flat_map(|s| s.personalized_elements.iter())
            .any(|e| e.element_type == ElementType::SocialProof);
        if uses_social_proof {
            return Err(EngineError::MalformedScript(
                "social proof used while disabled".to_string(),
            ));
        }
    }

    Ok((payload.estimated_duration_seconds, sections))
}

/// Normalize elements, close placeholders and validate one section
fn finish_section(
    kind: SectionKind,
    payload: SectionPayload,
    facts: &KnownFacts,
) -> Result<ScriptSection> {
    let tokens = placeholder_tokens(&payload.content);

    let mut seen = HashSet::new();
    let mut elements: Vec<PersonalizedElement> = payload
        .personalized_elements
        .into_iter()
        .map(|mut e| {
            e.placeholder = normalize_placeholder(&e.placeholder);
            e.value = e.value.trim().to_string();
            e
        })
        .filter(|e| !e.value.is_empty())
        .filter(|e| tokens.contains(&e.placeholder))
        .filter(|e| seen.insert(e.placeholder.clone()))
        .collect();

    for token in &tokens {
        if elements.iter().any(|e| &e.placeholder == token) {
            continue;
        }
        match facts.resolve(token) {
            Some(element) => elements.push(element),
            None => {
                return Err(EngineError::MalformedScript(format!(
                    "section '{}': placeholder {} unresolved",
                    kind.as_str(),
                    token
                )))
            }
        }
    }

    for element in &mut elements {
        if element.provenance == Provenance::AiInference
            && element.confidence.value() > MAX_INFERRED_CONFIDENCE
        {
            element.confidence = Confidence::saturating(MAX_INFERRED_CONFIDENCE);
        }
    }

    let section = ScriptSection {
        kind,
        content: payload.content.trim().to_string(),
        key_points: payload
            .key_points
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        estimated_duration_seconds: payload.estimated_duration_seconds,
        personalized_elements: elements,
    };
    section.validate().map_err(EngineError::MalformedScript)?;
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{analysis, script_reply, ScriptedBackend};

    fn context() -> LeadContext {
        LeadContext::new("lead-1", "Dana Reyes").with_company("Northwind")
    }

    fn config() -> ScriptConfig {
        ScriptConfig {
            initial_backoff_ms: 1,
            ..ScriptConfig::default()
        }
    }

    fn assignment(strategy: Strategy) -> VariantAssignment {
        VariantAssignment {
            test_id: "t1".into(),
            variant_id: "treatment".into(),
            strategy,
            include_objection_handling: Some(false),
            include_social_proof: None,
        }
    }

    #[test]
    fn test_strategy_precedence() {
        let a = analysis("lead-1", Strategy::Consultative, 70.0);
        let variant = assignment(Strategy::Urgency);

        let (s, source) = resolve_strategy(Some(Strategy::Direct), Some(&variant), &a);
        assert_eq!((s, source), (Strategy::Direct, StrategySource::Explicit));

        let (s, source) = resolve_strategy(None, Some(&variant), &a);
        assert_eq!(s, Strategy::Urgency);
        assert!(matches!(source, StrategySource::Experiment { ref variant_id, .. } if variant_id == "treatment"));

        let (s, source) = resolve_strategy(None, None, &a);
        assert_eq!((s, source), (Strategy::Consultative, StrategySource::Recommendation));
    }

    #[tokio::test]
    async fn test_generates_closed_script() {
        let backend = ScriptedBackend::new(&[&script_reply(true).to_string()]);
        let generator = ScriptGenerator::new(backend.clone(), config());
        let a = analysis("lead-1", Strategy::Consultative, 70.0);
        let script = generator
            .generate(&context(), &a, &ScriptOptions::new(CallObjective::Discovery), None)
            .await
            .unwrap();

        assert!(script.sections.validate().is_ok());
        assert_eq!(script.strategy_source, StrategySource::Recommendation);
        assert_eq!(script.section_duration_seconds, 240);
        assert!(!script.has_duration_divergence());

        // company was resolved from lead data, inferred pain point clamped
        let company = script
            .elements()
            .find(|e| e.placeholder == "{{company}}")
            .unwrap();
        assert_eq!(company.value, "Northwind");
        assert_eq!(company.provenance, Provenance::LeadData);
        let pain = script
            .elements()
            .find(|e| e.placeholder == "{{pain_point}}")
            .unwrap();
        assert!(pain.confidence.value() < 100.0);

        let request = backend.last_request().unwrap();
        assert!(request.semantics["strategy"].starts_with("consultative"));
        assert!(request.constraints.unwrap().include_objection_handling);
    }

    #[tokio::test]
    async fn test_variant_toggle_drops_objection_handling() {
        let backend = ScriptedBackend::new(&[&script_reply(true).to_string()]);
        let generator = ScriptGenerator::new(backend, config());
        let a = analysis("lead-1", Strategy::Consultative, 70.0);
        let variant = assignment(Strategy::Urgency);
        let script = generator
            .generate(&context(), &a, &ScriptOptions::new(CallObjective::Discovery), Some(&variant))
            .await
            .unwrap();

        assert!(script.sections.objection_handling.is_none());
        assert_eq!(script.strategy, Strategy::Urgency);
        assert!(script.has_duration_divergence());
        assert!(script
            .warnings
            .iter()
            .any(|w| matches!(w, ScriptWarning::DurationMismatch { .. })));
    }

    #[tokio::test]
    async fn test_unresolvable_placeholder_exhausts_retries() {
        let backend = ScriptedBackend::new(&[&script_reply(true).to_string()]);
        let generator = ScriptGenerator::new(
            backend.clone(),
            ScriptConfig {
                max_retries: 1,
                ..config()
            },
        );
        let a = analysis("lead-1", Strategy::Consultative, 70.0);
        // no company on record, so {{company}} cannot be closed
        let ctx = LeadContext::new("lead-1", "Dana");
        let err = generator
            .generate(&ctx, &a, &ScriptOptions::new(CallObjective::Discovery), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ScriptUnavailable { attempts: 2, .. }));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_low_confidence_closing_warns() {
        let backend = ScriptedBackend::new(&[&script_reply(true).to_string()]);
        let generator = ScriptGenerator::new(backend, config());
        let a = analysis("lead-1", Strategy::Direct, 30.0);
        let options = ScriptOptions::new(CallObjective::Closing).with_max_total_words(10);
        let script = generator.generate(&context(), &a, &options, None).await.unwrap();
        assert!(script
            .warnings
            .iter()
            .any(|w| matches!(w, ScriptWarning::LowAnalysisConfidence { .. })));
        assert!(script
            .warnings
            .iter()
            .any(|w| matches!(w, ScriptWarning::ExceedsWordBudget { budget: 10, .. })));
    }

    #[test]
    fn test_finish_section_prunes_and_dedupes() {
        let facts = KnownFacts::from_context(&context());
        let payload: SectionPayload = serde_json::from_value(serde_json::json!({
            "content": "Hi {{first_name}}",
            "estimated_duration_seconds": 10,
            "personalized_elements": [
                {"element_type": "name", "placeholder": "first_name", "value": "Dana",
                 "confidence": 95, "provenance": "lead_data"},
                {"element_type": "name", "placeholder": "{{first_name}}", "value": "D.",
                 "confidence": 50, "provenance": "ai_inference"},
                {"element_type": "industry", "placeholder": "{{industry}}", "value": "logistics",
                 "confidence": 80, "provenance": "industry_knowledge"}
            ]
        }))
        .unwrap();
        let section = finish_section(SectionKind::Opening, payload, &facts).unwrap();
        assert_eq!(section.personalized_elements.len(), 1);
        assert_eq!(section.rendered(), "Hi Dana");
    }

    #[test]
    fn test_social_proof_rejected_when_disabled() {
        let mut reply = script_reply(false);
        reply["presentation"]["content"] = serde_json::json!("Teams like {{peer}} switched.");
        reply["presentation"]["personalized_elements"] = serde_json::json!([
            {"element_type": "social_proof", "placeholder": "{{peer}}", "value": "Contoso",
             "confidence": 70, "provenance": "industry_knowledge"}
        ]);
        let response = GenerationResponse {
            payload: reply.to_string(),
            model: "m".into(),
            latency_ms: 0,
        };
        let toggles = Toggles {
            include_objection_handling: false,
            include_social_proof: false,
            max_total_words: 500,
        };
        let facts = KnownFacts::from_context(&context());
        assert!(matches!(
            decode_sections(&response, toggles, &facts),
            Err(EngineError::MalformedScript(_))
        ));
    }
}
