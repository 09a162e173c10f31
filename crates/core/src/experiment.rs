//! A/B test definitions and computed results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::analysis::Strategy;
use crate::error::{EngineError, Result};
use crate::lead::{LeadContext, LeadStatus};
use crate::script::CallObjective;

/// Tolerance when checking that traffic percentages sum to 100
const SPLIT_TOLERANCE: f32 = 0.01;

/// Lifecycle of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

impl TestStatus {
    /// Whether an operator may move a test from `self` to `to`
    pub fn can_transition_to(&self, to: TestStatus) -> bool {
        matches!(
            (self, to),
            (TestStatus::Draft, TestStatus::Running)
                | (TestStatus::Running, TestStatus::Paused)
                | (TestStatus::Paused, TestStatus::Running)
                | (TestStatus::Running, TestStatus::Completed)
                | (TestStatus::Paused, TestStatus::Completed)
        )
    }
}

/// Whether a metric is a proportion or a continuous measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Rate,
    Continuous,
}

/// Metric a test is judged on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMetric {
    ConversionRate,
    ObjectiveAchievementRate,
    CallSuccessRate,
    EngagementScore,
    SentimentScore,
    CallDurationSeconds,
}

impl PrimaryMetric {
    pub fn kind(&self) -> MetricKind {
        match self {
            PrimaryMetric::ConversionRate
            | PrimaryMetric::ObjectiveAchievementRate
            | PrimaryMetric::CallSuccessRate => MetricKind::Rate,
            PrimaryMetric::EngagementScore
            | PrimaryMetric::SentimentScore
            | PrimaryMetric::CallDurationSeconds => MetricKind::Continuous,
        }
    }
}

/// One treatment arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABVariant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_control: bool,
    /// Strategy forced on leads assigned to this variant
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_objection_handling: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_social_proof: Option<bool>,
}

/// Which leads a test covers; empty lists match everything
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetingCriteria {
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub objectives: Vec<CallObjective>,
    #[serde(default)]
    pub statuses: Vec<LeadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_qualification_score: Option<f32>,
}

impl TargetingCriteria {
    pub fn matches(&self, context: &LeadContext, objective: CallObjective) -> bool {
        if !self.objectives.is_empty() && !self.objectives.contains(&objective) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&context.qualification.status) {
            return false;
        }
        if !self.industries.is_empty() {
            let Some(ref industry) = context.industry else {
                return false;
            };
            if !self.industries.iter().any(|i| i.eq_ignore_ascii_case(industry)) {
                return false;
            }
        }
        if let Some(min) = self.min_qualification_score {
            match context.qualification.qualification_score {
                Some(score) if score >= min => {}
                _ => return false,
            }
        }
        true
    }
}

/// Experiment comparing strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABTest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: TestStatus,
    /// Ordered; the order defines the cumulative traffic ranges
    pub variants: Vec<ABVariant>,
    /// Variant id -> percentage, must sum to 100
    pub traffic_split: BTreeMap<String, f32>,
    #[serde(default)]
    pub targeting: TargetingCriteria,
    pub primary_metric: PrimaryMetric,
    pub min_sample_size: u32,
    pub confidence_level: f64,
    /// Hours after a variant's first assignment before its metric window closes
    pub measurement_window_hours: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ABTest {
    /// Check structural invariants of the test definition
    pub fn validate(&self) -> Result<()> {
        if self.variants.len() < 2 {
            return Err(EngineError::InvalidExperiment(format!(
                "test {} needs at least two variants",
                self.id
            )));
        }

        let controls = self.variants.iter().filter(|v| v.is_control).count();
        if controls != 1 {
            return Err(EngineError::InvalidExperiment(format!(
                "test {} must have exactly one control variant, found {}",
                self.id, controls
            )));
        }

        let mut ids = HashSet::new();
        for variant in &self.variants {
            if !ids.insert(variant.id.as_str()) {
                return Err(EngineError::InvalidExperiment(format!(
                    "duplicate variant id {}",
                    variant.id
                )));
            }
            match self.traffic_split.get(&variant.id) {
                Some(pct) if pct.is_finite() && *pct >= 0.0 => {}
                Some(pct) => {
                    return Err(EngineError::InvalidExperiment(format!(
                        "variant {} has invalid traffic share {}",
                        variant.id, pct
                    )))
                }
                None => {
                    return Err(EngineError::InvalidExperiment(format!(
                        "variant {} missing from traffic split",
                        variant.id
                    )))
                }
            }
        }
        if self.traffic_split.keys().any(|k| !ids.contains(k.as_str())) {
            return Err(EngineError::InvalidExperiment(
                "traffic split references unknown variant".to_string(),
            ));
        }

        let total: f32 = self.traffic_split.values().sum();
        if (total - 100.0).abs() > SPLIT_TOLERANCE {
            return Err(EngineError::InvalidExperiment(format!(
                "traffic split sums to {}, expected 100",
                total
            )));
        }

        if !(0.5..1.0).contains(&self.confidence_level) {
            return Err(EngineError::InvalidExperiment(format!(
                "confidence level {} outside [0.5, 1.0)",
                self.confidence_level
            )));
        }
        if self.min_sample_size == 0 {
            return Err(EngineError::InvalidExperiment(
                "min_sample_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn control(&self) -> Option<&ABVariant> {
        self.variants.iter().find(|v| v.is_control)
    }

    pub fn variant(&self, id: &str) -> Option<&ABVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Whether this test applies to a lead for a given objective right now
    pub fn covers(&self, context: &LeadContext, objective: CallObjective) -> bool {
        self.status == TestStatus::Running && self.targeting.matches(context, objective)
    }
}

/// Computed per-variant outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,
    pub is_control: bool,
    pub participants: u32,
    pub observations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<f64>,
    /// Relative change against the control metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lift_vs_control: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    /// Per-arm sample needed to detect the observed effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_sample_size: Option<u32>,
    pub significant: bool,
}

/// Results derived from participation and observations; never hand-edited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABTestResults {
    pub test_id: String,
    pub status: TestStatus,
    pub primary_metric: PrimaryMetric,
    pub total_participants: u32,
    pub min_sample_size: u32,
    pub minimum_sample_reached: bool,
    pub confidence_level: f64,
    pub variants: Vec<VariantResult>,
    pub statistical_significance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_variant: Option<String>,
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: &str, control: bool, strategy: Strategy) -> ABVariant {
        ABVariant {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            is_control: control,
            strategy,
            include_objection_handling: None,
            include_social_proof: None,
        }
    }

    fn test_def() -> ABTest {
        ABTest {
            id: "t1".into(),
            name: "urgency vs consultative".into(),
            description: String::new(),
            status: TestStatus::Draft,
            variants: vec![
                variant("control", true, Strategy::Consultative),
                variant("treatment", false, Strategy::Urgency),
            ],
            traffic_split: BTreeMap::from([("control".into(), 50.0), ("treatment".into(), 50.0)]),
            targeting: TargetingCriteria::default(),
            primary_metric: PrimaryMetric::ConversionRate,
            min_sample_size: 100,
            confidence_level: 0.95,
            measurement_window_hours: 24,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_valid_definition() {
        assert!(test_def().validate().is_ok());
    }

    #[test]
    fn test_split_must_sum_to_100() {
        let mut t = test_def();
        t.traffic_split.insert("treatment".into(), 40.0);
        assert!(matches!(t.validate(), Err(EngineError::InvalidExperiment(_))));
    }

    #[test]
    fn test_exactly_one_control() {
        let mut t = test_def();
        t.variants[1].is_control = true;
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_transitions() {
        assert!(TestStatus::Draft.can_transition_to(TestStatus::Running));
        assert!(TestStatus::Running.can_transition_to(TestStatus::Paused));
        assert!(TestStatus::Paused.can_transition_to(TestStatus::Running));
        assert!(!TestStatus::Completed.can_transition_to(TestStatus::Running));
        assert!(!TestStatus::Draft.can_transition_to(TestStatus::Paused));
    }

    #[test]
    fn test_targeting() {
        let ctx = LeadContext::new("l1", "Dana").with_industry("Fintech");
        let mut criteria = TargetingCriteria {
            industries: vec!["fintech".into()],
            ..Default::default()
        };
        assert!(criteria.matches(&ctx, CallObjective::Closing));

        criteria.objectives = vec![CallObjective::Discovery];
        assert!(!criteria.matches(&ctx, CallObjective::Closing));

        let criteria = TargetingCriteria {
            min_qualification_score: Some(50.0),
            ..Default::default()
        };
        assert!(!criteria.matches(&ctx, CallObjective::Closing));
    }
}
