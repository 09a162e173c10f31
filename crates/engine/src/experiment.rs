//! A/B test management
//!
//! Tests live in memory. Variant assignment is a pure function of the test
//! definition and `(test_id, lead_id)`, so a lead lands in the same variant
//! after a restart; the audit log only records that it happened.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use lead_engine_config::AbTestingConfig;
use lead_engine_core::{
    ABTest, ABTestResults, ABVariant, CallObjective, CallOutcome, EngineError, LeadContext,
    MetricKind, PrimaryMetric, Result, Strategy, TargetingCriteria, TestStatus, VariantResult,
};

use crate::stats;
use crate::telemetry;

/// Hash buckets per percentage point of traffic
const BUCKETS_PER_PERCENT: u64 = 100;

/// Variant a lead is assigned to, with the overrides it forces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAssignment {
    pub test_id: String,
    pub variant_id: String,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_objection_handling: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_social_proof: Option<bool>,
}

impl VariantAssignment {
    fn new(test_id: &str, variant: &ABVariant) -> Self {
        Self {
            test_id: test_id.to_string(),
            variant_id: variant.id.clone(),
            strategy: variant.strategy,
            include_objection_handling: variant.include_objection_handling,
            include_social_proof: variant.include_social_proof,
        }
    }
}

/// Audit entry for one assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub test_id: String,
    pub lead_id: String,
    pub variant_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// Test definition as submitted by an operator; omitted settings take defaults
#[derive(Debug, Clone, Deserialize)]
pub struct NewABTest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub variants: Vec<ABVariant>,
    /// Even split when omitted
    #[serde(default)]
    pub traffic_split: Option<BTreeMap<String, f32>>,
    #[serde(default)]
    pub targeting: TargetingCriteria,
    pub primary_metric: PrimaryMetric,
    #[serde(default)]
    pub min_sample_size: Option<u32>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub measurement_window_hours: Option<u32>,
}

fn even_split(variants: &[ABVariant]) -> BTreeMap<String, f32> {
    let n = variants.len().max(1) as f32;
    let share = (100.0 / n * 100.0).floor() / 100.0;
    let mut split: BTreeMap<String, f32> =
        variants.iter().map(|v| (v.id.clone(), share)).collect();
    if let Some(last) = variants.last() {
        split.insert(last.id.clone(), 100.0 - share * (n - 1.0));
    }
    split
}

/// Stable bucket in `[0, 100 * BUCKETS_PER_PERCENT)` for a lead within a test
fn bucket(test_id: &str, lead_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(test_id.as_bytes());
    hasher.update(b":");
    hasher.update(lead_id.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % (100 * BUCKETS_PER_PERCENT)
}

/// Variant for a lead under the test's traffic split
///
/// Variants are laid out as cumulative ranges in definition order.
pub fn assign_variant<'a>(test: &'a ABTest, lead_id: &str) -> Option<&'a ABVariant> {
    let point = bucket(&test.id, lead_id) as f64 / BUCKETS_PER_PERCENT as f64;
    let mut upper = 0.0f64;
    for variant in &test.variants {
        let share = test.traffic_split.get(&variant.id).copied().unwrap_or(0.0) as f64;
        upper += share;
        if share > 0.0 && point < upper {
            return Some(variant);
        }
    }
    // rounding slack at the top of the range
    test.variants
        .iter()
        .rev()
        .find(|v| test.traffic_split.get(&v.id).is_some_and(|s| *s > 0.0))
}

/// Primary-metric value carried by a call outcome
pub fn observation_for(metric: PrimaryMetric, outcome: &CallOutcome) -> Option<f64> {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    match metric {
        PrimaryMetric::ConversionRate | PrimaryMetric::ObjectiveAchievementRate => {
            Some(flag(outcome.objective_achieved))
        }
        PrimaryMetric::CallSuccessRate => Some(flag(outcome.successful)),
        PrimaryMetric::EngagementScore => outcome.engagement.map(f64::from),
        PrimaryMetric::SentimentScore => outcome.sentiment.map(f64::from),
        PrimaryMetric::CallDurationSeconds => outcome.duration_seconds.map(f64::from),
    }
}

#[derive(Debug, Default)]
struct Participation {
    /// lead -> variant
    assignments: HashMap<String, String>,
    first_assigned_at: HashMap<String, DateTime<Utc>>,
    /// lead -> latest observed metric value
    observations: HashMap<String, f64>,
    audit: Vec<AssignmentRecord>,
}

impl Participation {
    fn participants(&self, variant_id: &str) -> u32 {
        self.assignments.values().filter(|v| *v == variant_id).count() as u32
    }

    fn values(&self, variant_id: &str) -> Vec<f64> {
        self.assignments
            .iter()
            .filter(|(_, v)| *v == variant_id)
            .filter_map(|(lead, _)| self.observations.get(lead).copied())
            .collect()
    }
}

#[derive(Debug)]
struct TestEntry {
    test: ABTest,
    participation: Participation,
}

impl TestEntry {
    /// Complete a running test once the sample is in and a window has closed
    fn complete_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.test.status != TestStatus::Running {
            return false;
        }
        let total = self.participation.assignments.len() as u32;
        let window = Duration::hours(self.test.measurement_window_hours as i64);
        let window_closed = self
            .participation
            .first_assigned_at
            .values()
            .any(|first| *first + window <= now);
        if total < self.test.min_sample_size || !window_closed {
            return false;
        }

        self.test.status = TestStatus::Completed;
        self.test.completed_at = Some(now);
        tracing::info!(test_id = %self.test.id, participants = total, "A/B test auto-completed");
        true
    }
}

/// Owns experiment definitions, participation and results
pub struct ABTestManager {
    tests: DashMap<String, TestEntry>,
    config: AbTestingConfig,
}

impl ABTestManager {
    pub fn new(config: AbTestingConfig) -> Self {
        Self {
            tests: DashMap::new(),
            config,
        }
    }

    /// Register a new test in `draft`
    pub fn create_test(&self, new: NewABTest) -> Result<ABTest> {
        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.tests.contains_key(&id) {
            return Err(EngineError::InvalidExperiment(format!("test {} already exists", id)));
        }
        let traffic_split = new.traffic_split.unwrap_or_else(|| even_split(&new.variants));
        let test = ABTest {
            id: id.clone(),
            name: new.name,
            description: new.description,
            status: TestStatus::Draft,
            variants: new.variants,
            traffic_split,
            targeting: new.targeting,
            primary_metric: new.primary_metric,
            min_sample_size: new.min_sample_size.unwrap_or(self.config.default_min_sample_size),
            confidence_level: new
                .confidence_level
                .unwrap_or(self.config.default_confidence_level),
            measurement_window_hours: new
                .measurement_window_hours
                .unwrap_or(self.config.default_measurement_window_hours),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        test.validate()?;

        tracing::info!(test_id = %id, name = %test.name, variants = test.variants.len(), "A/B test created");
        self.tests.insert(
            id,
            TestEntry {
                test: test.clone(),
                participation: Participation::default(),
            },
        );
        Ok(test)
    }

    pub fn get_test(&self, test_id: &str) -> Result<ABTest> {
        let mut entry = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(test_id.to_string()))?;
        entry.complete_if_due(Utc::now());
        Ok(entry.test.clone())
    }

    /// All tests, oldest first
    pub fn list_tests(&self) -> Vec<ABTest> {
        let now = Utc::now();
        let mut tests: Vec<ABTest> = self
            .tests
            .iter_mut()
            .map(|mut e| {
                e.complete_if_due(now);
                e.test.clone()
            })
            .collect();
        tests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tests
    }

    pub fn start_test(&self, test_id: &str) -> Result<ABTest> {
        self.transition(test_id, TestStatus::Draft, TestStatus::Running)
    }

    pub fn pause_test(&self, test_id: &str) -> Result<ABTest> {
        self.transition(test_id, TestStatus::Running, TestStatus::Paused)
    }

    pub fn resume_test(&self, test_id: &str) -> Result<ABTest> {
        self.transition(test_id, TestStatus::Paused, TestStatus::Running)
    }

    pub fn complete_test(&self, test_id: &str) -> Result<ABTest> {
        let mut entry = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(test_id.to_string()))?;
        let from = entry.test.status;
        if !from.can_transition_to(TestStatus::Completed) {
            return Err(EngineError::InvalidTransition {
                test_id: test_id.to_string(),
                from,
                to: TestStatus::Completed,
            });
        }
        entry.test.status = TestStatus::Completed;
        entry.test.completed_at = Some(Utc::now());
        tracing::info!(test_id, "A/B test completed");
        Ok(entry.test.clone())
    }

    fn transition(&self, test_id: &str, expected: TestStatus, to: TestStatus) -> Result<ABTest> {
        let mut entry = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(test_id.to_string()))?;
        let from = entry.test.status;
        if from != expected || !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                test_id: test_id.to_string(),
                from,
                to,
            });
        }
        entry.test.status = to;
        if to == TestStatus::Running && entry.test.started_at.is_none() {
            entry.test.started_at = Some(Utc::now());
        }
        tracing::info!(test_id, from = ?from, to = ?to, "A/B test status changed");
        Ok(entry.test.clone())
    }

    /// Assign a lead to a variant of a running test
    ///
    /// Repeated calls for the same lead return the recorded variant without
    /// counting the lead twice. A test that is due completes before the lead
    /// is enrolled, and again as soon as the enrollment makes it due.
    pub fn assign(&self, test_id: &str, lead_id: &str) -> Result<VariantAssignment> {
        let mut entry = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(test_id.to_string()))?;
        let now = Utc::now();
        entry.complete_if_due(now);
        if entry.test.status != TestStatus::Running {
            return Err(EngineError::InvalidExperiment(format!(
                "test {} is not running",
                test_id
            )));
        }

        let TestEntry { test, participation } = &mut *entry;
        if let Some(variant_id) = participation.assignments.get(lead_id) {
            if let Some(variant) = test.variant(variant_id) {
                return Ok(VariantAssignment::new(test_id, variant));
            }
        }

        let variant = assign_variant(test, lead_id).ok_or_else(|| {
            EngineError::InvalidExperiment(format!("test {} has no traffic", test_id))
        })?;
        participation
            .assignments
            .insert(lead_id.to_string(), variant.id.clone());
        participation
            .first_assigned_at
            .entry(variant.id.clone())
            .or_insert(now);
        participation.audit.push(AssignmentRecord {
            test_id: test_id.to_string(),
            lead_id: lead_id.to_string(),
            variant_id: variant.id.clone(),
            assigned_at: now,
        });

        telemetry::record_assignment(test_id, &variant.id);
        tracing::debug!(test_id, lead_id, variant_id = %variant.id, "Lead assigned to variant");
        let assignment = VariantAssignment::new(test_id, variant);
        entry.complete_if_due(now);
        Ok(assignment)
    }

    /// Oldest running test whose targeting covers the lead
    fn covering_test(&self, context: &LeadContext, objective: CallObjective) -> Option<String> {
        let now = Utc::now();
        self.tests
            .iter_mut()
            .filter_map(|mut e| {
                e.complete_if_due(now);
                e.test
                    .covers(context, objective)
                    .then(|| (e.test.created_at, e.test.id.clone()))
            })
            .min()
            .map(|(_, id)| id)
    }

    /// Variant the lead would get from the covering test, without enrolling it
    pub fn select_assignment(
        &self,
        context: &LeadContext,
        objective: CallObjective,
    ) -> Option<VariantAssignment> {
        let test_id = self.covering_test(context, objective)?;
        let entry = self.tests.get(&test_id)?;
        let variant = match entry.participation.assignments.get(&context.lead_id) {
            Some(variant_id) => entry.test.variant(variant_id),
            None => assign_variant(&entry.test, &context.lead_id),
        }?;
        Some(VariantAssignment::new(&test_id, variant))
    }

    /// Assignment under the oldest running test whose targeting covers the lead
    pub fn active_assignment(
        &self,
        context: &LeadContext,
        objective: CallObjective,
    ) -> Option<VariantAssignment> {
        let test_id = self.covering_test(context, objective)?;

        match self.assign(&test_id, &context.lead_id) {
            Ok(assignment) => Some(assignment),
            Err(e) => {
                tracing::warn!(test_id = %test_id, lead_id = %context.lead_id, error = %e, "Variant assignment failed");
                None
            }
        }
    }

    /// Record a primary-metric observation for a participant
    pub fn record_observation(&self, test_id: &str, lead_id: &str, value: f64) -> Result<()> {
        let mut entry = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(test_id.to_string()))?;
        if !value.is_finite() {
            return Err(EngineError::InvalidExperiment(format!(
                "observation {} is not finite",
                value
            )));
        }
        if entry.test.primary_metric.kind() == MetricKind::Rate && value != 0.0 && value != 1.0 {
            return Err(EngineError::InvalidExperiment(format!(
                "rate metric {:?} takes 0 or 1, got {}",
                entry.test.primary_metric, value
            )));
        }
        if !entry.participation.assignments.contains_key(lead_id) {
            return Err(EngineError::InvalidExperiment(format!(
                "lead {} is not a participant of test {}",
                lead_id, test_id
            )));
        }
        entry
            .participation
            .observations
            .insert(lead_id.to_string(), value);
        Ok(())
    }

    /// Assignment audit log of a test, oldest first
    pub fn assignments(&self, test_id: &str) -> Result<Vec<AssignmentRecord>> {
        self.tests
            .get(test_id)
            .map(|e| e.participation.audit.clone())
            .ok_or_else(|| EngineError::ExperimentNotFound(test_id.to_string()))
    }

    /// Current results, completing the test first if it is due
    pub fn results(&self, test_id: &str) -> Result<ABTestResults> {
        let mut entry = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(test_id.to_string()))?;
        entry.complete_if_due(Utc::now());
        Ok(compute_results(
            &entry.test,
            &entry.participation,
            self.config.statistical_power,
        ))
    }
}

fn compute_results(test: &ABTest, participation: &Participation, power: f64) -> ABTestResults {
    let total_participants = participation.assignments.len() as u32;
    let minimum_sample_reached = total_participants >= test.min_sample_size;
    let alpha = 1.0 - test.confidence_level;
    let kind = test.primary_metric.kind();

    let control_id = test.control().map(|c| c.id.clone()).unwrap_or_default();
    let control_values = participation.values(&control_id);
    let control_metric = (!control_values.is_empty()).then(|| stats::mean(&control_values));

    let variants: Vec<VariantResult> = test
        .variants
        .iter()
        .map(|variant| {
            let values = participation.values(&variant.id);
            let metric_value = (!values.is_empty()).then(|| stats::mean(&values));
            let mut result = VariantResult {
                variant_id: variant.id.clone(),
                is_control: variant.is_control,
                participants: participation.participants(&variant.id),
                observations: values.len() as u32,
                metric_value,
                lift_vs_control: None,
                p_value: None,
                required_sample_size: None,
                significant: false,
            };
            if variant.is_control {
                return result;
            }

            if let (Some(m), Some(c)) = (metric_value, control_metric) {
                if c != 0.0 {
                    result.lift_vs_control = Some((m - c) / c.abs());
                }
            }
            if let Some(cmp) = stats::compare(kind, &control_values, &values, test.confidence_level, power) {
                result.p_value = Some(cmp.p_value);
                result.required_sample_size = cmp.required_per_arm;
                let enough = cmp.required_per_arm.is_some_and(|n| {
                    values.len() as u32 >= n && control_values.len() as u32 >= n
                });
                result.significant = minimum_sample_reached && cmp.p_value < alpha && enough;
            }
            result
        })
        .collect();

    let statistical_significance = variants.iter().any(|v| v.significant);
    let winning_variant = if statistical_significance {
        let best_treatment = variants
            .iter()
            .filter(|v| v.significant)
            .filter(|v| matches!((v.metric_value, control_metric), (Some(m), Some(c)) if m > c))
            .max_by(|a, b| {
                a.metric_value
                    .partial_cmp(&b.metric_value)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match best_treatment {
            Some(v) => Some(v.variant_id.clone()),
            // every significant difference favors control
            None => Some(control_id),
        }
    } else {
        None
    };

    ABTestResults {
        test_id: test.id.clone(),
        status: test.status,
        primary_metric: test.primary_metric,
        total_participants,
        min_sample_size: test.min_sample_size,
        minimum_sample_reached,
        confidence_level: test.confidence_level,
        variants,
        statistical_significance,
        winning_variant,
        computed_at: Utc::now(),
    }
}
