//! Context analysis: personality, communication style, strategy and confidence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence score bounded to [0, 100]
///
/// Construction and deserialization both reject out-of-range or non-finite
/// values, so a `Confidence` held anywhere is always valid.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Confidence(f32);

impl Confidence {
    pub const MIN: Confidence = Confidence(0.0);
    pub const MAX: Confidence = Confidence(100.0);

    pub fn new(value: f32) -> Option<Self> {
        if value.is_finite() && (0.0..=100.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Clamp any finite value into range; NaN maps to zero
    pub fn saturating(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 100.0))
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Lower of the two scores
    pub fn capped_at(self, cap: Confidence) -> Self {
        if self.0 > cap.0 {
            cap
        } else {
            self
        }
    }
}

impl TryFrom<f32> for Confidence {
    type Error = String;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Confidence::new(value).ok_or_else(|| format!("confidence {} outside [0, 100]", value))
    }
}

impl From<Confidence> for f32 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}", self.0)
    }
}

/// Behavioral personality profile of the contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityProfile {
    Analytical,
    Driver,
    Expressive,
    Amiable,
}

impl PersonalityProfile {
    pub const ALL: [PersonalityProfile; 4] = [
        PersonalityProfile::Analytical,
        PersonalityProfile::Driver,
        PersonalityProfile::Expressive,
        PersonalityProfile::Amiable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonalityProfile::Analytical => "analytical",
            PersonalityProfile::Driver => "driver",
            PersonalityProfile::Expressive => "expressive",
            PersonalityProfile::Amiable => "amiable",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PersonalityProfile::Analytical => {
                "Data-driven and cautious; wants evidence, detail and time to evaluate"
            }
            PersonalityProfile::Driver => {
                "Results-oriented and decisive; wants the bottom line and control"
            }
            PersonalityProfile::Expressive => {
                "Enthusiastic and big-picture; responds to vision, stories and recognition"
            }
            PersonalityProfile::Amiable => {
                "Relationship-focused and consensus-seeking; values trust and low risk"
            }
        }
    }
}

impl fmt::Display for PersonalityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferred communication register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    Formal,
    Casual,
    Technical,
    Business,
}

impl CommunicationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationStyle::Formal => "formal",
            CommunicationStyle::Casual => "casual",
            CommunicationStyle::Technical => "technical",
            CommunicationStyle::Business => "business",
        }
    }
}

impl fmt::Display for CommunicationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sales conversation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Consultative,
    Direct,
    Educational,
    Relationship,
    Urgency,
    SocialProof,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::Consultative,
        Strategy::Direct,
        Strategy::Educational,
        Strategy::Relationship,
        Strategy::Urgency,
        Strategy::SocialProof,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Consultative => "consultative",
            Strategy::Direct => "direct",
            Strategy::Educational => "educational",
            Strategy::Relationship => "relationship",
            Strategy::Urgency => "urgency",
            Strategy::SocialProof => "social_proof",
        }
    }

    /// Semantic description passed to the generation backend
    pub fn description(&self) -> &'static str {
        match self {
            Strategy::Consultative => {
                "Ask open questions, diagnose the lead's situation and position the product as a tailored solution"
            }
            Strategy::Direct => {
                "Be concise and outcome-focused; state the value, the ask and the next step without detours"
            }
            Strategy::Educational => {
                "Teach the lead something useful about their problem space and let the product follow from the insight"
            }
            Strategy::Relationship => {
                "Build rapport and trust first; reference shared history and keep pressure low"
            }
            Strategy::Urgency => {
                "Highlight time-bound costs of inaction and limited-time opportunities, without being pushy"
            }
            Strategy::SocialProof => {
                "Lean on peer companies, case studies and adoption in the lead's industry"
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, cacheable analysis of a lead context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub lead_id: String,
    pub personality_profile: PersonalityProfile,
    pub communication_style: CommunicationStyle,
    pub recommended_strategy: Strategy,
    /// Ranked, strongest first
    pub value_drivers: Vec<String>,
    /// Ranked, most likely first
    pub objection_patterns: Vec<String>,
    pub key_talking_points: Vec<String>,
    pub avoidance_topics: Vec<String>,
    pub profile_confidence: Confidence,
    pub recommendation_confidence: Confidence,
    /// Set when the strategy was implausible for the profile and confidence was capped
    #[serde(default)]
    pub plausibility_capped: bool,
    /// Set when sparse input lowered profile confidence
    #[serde(default)]
    pub evidence_capped: bool,
    pub analyzed_at: DateTime<Utc>,
    /// Backend that produced the judgment
    pub generated_by: String,
}

impl ContextAnalysis {
    /// Lower of the two confidence scores
    pub fn overall_confidence(&self) -> Confidence {
        self.profile_confidence.capped_at(self.recommendation_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_bounds() {
        assert!(Confidence::new(0.0).is_some());
        assert!(Confidence::new(100.0).is_some());
        assert!(Confidence::new(100.5).is_none());
        assert!(Confidence::new(-1.0).is_none());
        assert!(Confidence::new(f32::NAN).is_none());
        assert_eq!(Confidence::saturating(140.0).value(), 100.0);
    }

    #[test]
    fn test_confidence_deserialize_rejects_out_of_range() {
        let ok: Result<Confidence, _> = serde_json::from_str("72.5");
        assert_eq!(ok.unwrap().value(), 72.5);
        let bad: Result<Confidence, _> = serde_json::from_str("150");
        assert!(bad.is_err());
    }

    #[test]
    fn test_strategy_wire_names() {
        let s: Strategy = serde_json::from_str("\"social_proof\"").unwrap();
        assert_eq!(s, Strategy::SocialProof);
        assert!(serde_json::from_str::<Strategy>("\"aggressive\"").is_err());
        for strategy in Strategy::ALL {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy.as_str()));
        }
    }
}
