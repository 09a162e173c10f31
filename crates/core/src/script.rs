//! Personalized call scripts
//!
//! A script holds up to five ordered sections. Section text may contain
//! `{{token}}` placeholders; each token must be backed by exactly one
//! [`PersonalizedElement`] in the same section, and no element may be unused.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::analysis::{Confidence, Strategy};
use crate::error::{EngineError, Result};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Distinct `{{token}}` placeholders in order of first appearance
pub fn placeholder_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let token = format!("{{{{{}}}}}", &caps[1]);
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Canonical `{{name}}` form of a placeholder, accepting bare names too
pub fn normalize_placeholder(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(trimmed)
        .trim();
    format!("{{{{{}}}}}", inner)
}

/// Goal of a specific call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallObjective {
    Qualification,
    Discovery,
    DemoScheduling,
    FollowUp,
    Closing,
    Reengagement,
}

impl CallObjective {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallObjective::Qualification => "qualification",
            CallObjective::Discovery => "discovery",
            CallObjective::DemoScheduling => "demo_scheduling",
            CallObjective::FollowUp => "follow_up",
            CallObjective::Closing => "closing",
            CallObjective::Reengagement => "reengagement",
        }
    }

    /// Semantic description passed to the generation backend
    pub fn description(&self) -> &'static str {
        match self {
            CallObjective::Qualification => {
                "Confirm budget, authority, need and timeline; decide whether to pursue the lead"
            }
            CallObjective::Discovery => {
                "Uncover pain points, current tooling and success criteria in depth"
            }
            CallObjective::DemoScheduling => {
                "Earn agreement to a product demonstration and book a concrete time slot"
            }
            CallObjective::FollowUp => {
                "Reconnect after a previous touchpoint, answer open questions and advance one step"
            }
            CallObjective::Closing => {
                "Resolve final objections and secure a commitment to purchase or sign"
            }
            CallObjective::Reengagement => {
                "Revive a lead that went quiet by offering new value and a low-friction next step"
            }
        }
    }
}

impl fmt::Display for CallObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script section identity, in delivery order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Opening,
    Discovery,
    Presentation,
    ObjectionHandling,
    Closing,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Opening => "opening",
            SectionKind::Discovery => "discovery",
            SectionKind::Presentation => "presentation",
            SectionKind::ObjectionHandling => "objection_handling",
            SectionKind::Closing => "closing",
        }
    }
}

/// What kind of fact a personalized element substitutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Name,
    Company,
    Industry,
    Role,
    Product,
    PainPoint,
    ValueDriver,
    SocialProof,
    PreviousInteraction,
    Custom,
}

/// Source category justifying a personalized value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    LeadData,
    ConversationHistory,
    IndustryKnowledge,
    AiInference,
}

/// Resolved placeholder in section text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizedElement {
    pub element_type: ElementType,
    /// Canonical `{{token}}`
    pub placeholder: String,
    pub value: String,
    pub confidence: Confidence,
    pub provenance: Provenance,
}

impl PersonalizedElement {
    pub fn new(
        element_type: ElementType,
        placeholder: &str,
        value: impl Into<String>,
        confidence: Confidence,
        provenance: Provenance,
    ) -> Self {
        Self {
            element_type,
            placeholder: normalize_placeholder(placeholder),
            value: value.into(),
            confidence,
            provenance,
        }
    }
}

/// One section of a call script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSection {
    pub kind: SectionKind,
    pub content: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub estimated_duration_seconds: u32,
    #[serde(default)]
    pub personalized_elements: Vec<PersonalizedElement>,
}

impl ScriptSection {
    /// Check content, duration and placeholder closure for this section
    pub fn validate(&self) -> std::result::Result<(), String> {
        let kind = self.kind.as_str();
        if self.content.trim().is_empty() {
            return Err(format!("section '{}' has empty content", kind));
        }
        if self.estimated_duration_seconds == 0 {
            return Err(format!("section '{}' has no estimated duration", kind));
        }

        let tokens = placeholder_tokens(&self.content);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for element in &self.personalized_elements {
            *counts.entry(element.placeholder.as_str()).or_default() += 1;
            if element.provenance == Provenance::AiInference && element.confidence.value() >= 100.0
            {
                return Err(format!(
                    "section '{}': inferred element {} reports full confidence",
                    kind, element.placeholder
                ));
            }
        }

        for token in &tokens {
            match counts.get(token.as_str()) {
                None => {
                    return Err(format!("section '{}': placeholder {} unresolved", kind, token))
                }
                Some(n) if *n > 1 => {
                    return Err(format!(
                        "section '{}': placeholder {} resolved {} times",
                        kind, token, n
                    ))
                }
                _ => {}
            }
        }
        for placeholder in counts.keys() {
            if !tokens.iter().any(|t| t == placeholder) {
                return Err(format!(
                    "section '{}': element {} not used in content",
                    kind, placeholder
                ));
            }
        }
        Ok(())
    }

    /// Content with every placeholder replaced by its resolved value
    pub fn rendered(&self) -> String {
        PLACEHOLDER_RE
            .replace_all(&self.content, |caps: &regex::Captures<'_>| {
                let token = format!("{{{{{}}}}}", &caps[1]);
                self.personalized_elements
                    .iter()
                    .find(|e| e.placeholder == token)
                    .map(|e| e.value.clone())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// The ordered sections of a script
///
/// `objection_handling` is `None` when it was turned off for the request; it
/// is then omitted from the serialized structure entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSections {
    pub opening: ScriptSection,
    pub discovery: ScriptSection,
    pub presentation: ScriptSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objection_handling: Option<ScriptSection>,
    pub closing: ScriptSection,
}

impl ScriptSections {
    /// Sections in delivery order
    pub fn in_order(&self) -> Vec<&ScriptSection> {
        let mut sections = vec![&self.opening, &self.discovery, &self.presentation];
        if let Some(ref objection) = self.objection_handling {
            sections.push(objection);
        }
        sections.push(&self.closing);
        sections
    }

    pub fn total_duration_seconds(&self) -> u32 {
        self.in_order().iter().map(|s| s.estimated_duration_seconds).sum()
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for section in self.in_order() {
            section.validate()?;
        }
        Ok(())
    }
}

/// How the script's strategy was chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StrategySource {
    /// Forced by the caller
    Explicit,
    /// Forced by an active A/B test variant
    Experiment { test_id: String, variant_id: String },
    /// Taken from the analysis recommendation
    Recommendation,
    /// Generic script used when personalization was unavailable
    Fallback,
}

/// Non-fatal issues attached to a successful script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ScriptWarning {
    LowAnalysisConfidence { confidence: f32, minimum: f32 },
    DurationMismatch { headline_seconds: u32, section_total_seconds: u32 },
    ExceedsWordBudget { words: usize, budget: u32 },
    ImplausibleStrategy { strategy: Strategy },
    NotPersonalized { reason: String },
}

/// Immutable call script for one (lead, objective, strategy) generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizedScript {
    pub id: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub lead_id: String,
    pub objective: CallObjective,
    pub strategy: Strategy,
    pub strategy_source: StrategySource,
    pub sections: ScriptSections,
    /// Headline duration as reported at generation time
    pub estimated_duration_seconds: u32,
    /// Sum of section durations
    pub section_duration_seconds: u32,
    #[serde(default)]
    pub warnings: Vec<ScriptWarning>,
    #[serde(default)]
    pub is_fallback: bool,
    pub created_at: DateTime<Utc>,
    pub generated_by: String,
}

impl PersonalizedScript {
    /// All personalized elements across sections
    pub fn elements(&self) -> impl Iterator<Item = &PersonalizedElement> {
        self.sections
            .in_order()
            .into_iter()
            .flat_map(|s| s.personalized_elements.iter())
    }

    /// Whether the headline and section-sum durations disagree
    pub fn has_duration_divergence(&self) -> bool {
        self.estimated_duration_seconds != self.section_duration_seconds
    }

    /// Produce the next version of this script
    ///
    /// The original is left untouched. The edited sections are re-validated;
    /// the new version gets a fresh id and timestamp and links back via
    /// `parent_id`. The headline duration becomes the new section total.
    pub fn revise(&self, edit: impl FnOnce(&mut ScriptSections)) -> Result<PersonalizedScript> {
        let mut sections = self.sections.clone();
        edit(&mut sections);
        sections.validate().map_err(EngineError::MalformedScript)?;

        let total = sections.total_duration_seconds();
        let warnings = self
            .warnings
            .iter()
            .filter(|w| !matches!(w, ScriptWarning::DurationMismatch { .. }))
            .cloned()
            .collect();

        Ok(PersonalizedScript {
            id: Uuid::new_v4().to_string(),
            version: self.version + 1,
            parent_id: Some(self.id.clone()),
            lead_id: self.lead_id.clone(),
            objective: self.objective,
            strategy: self.strategy,
            strategy_source: self.strategy_source.clone(),
            sections,
            estimated_duration_seconds: total,
            section_duration_seconds: total,
            warnings,
            is_fallback: self.is_fallback,
            created_at: Utc::now(),
            generated_by: self.generated_by.clone(),
        })
    }
}
