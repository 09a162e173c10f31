//! Analytics events and performance summaries

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::analysis::Strategy;
use crate::script::{CallObjective, PersonalizedScript, StrategySource};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AnalysisCompleted,
    ScriptGenerated,
    ScriptUsed,
    OutcomeRecorded,
    GenerationFailed,
    /// Result arrived after the caller's deadline and was not delivered
    LateDiscarded,
}

/// Terminal result of a call that used a script
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub objective_achieved: bool,
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    /// Engagement in [0, 100]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<f32>,
    /// Sentiment in [-1.0, 1.0]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f32>,
}

/// Reference to a delivered script, as reported back by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptUsage {
    pub lead_id: String,
    pub script_id: String,
    pub strategy: Strategy,
    pub objective: CallObjective,
    pub strategy_source: StrategySource,
}

impl From<&PersonalizedScript> for ScriptUsage {
    fn from(script: &PersonalizedScript) -> Self {
        Self {
            lead_id: script.lead_id.clone(),
            script_id: script.id.clone(),
            strategy: script.strategy,
            objective: script.objective,
            strategy_source: script.strategy_source.clone(),
        }
    }
}

/// Single analytics record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub lead_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<CallObjective>,
    /// `None` on an outcome event means the outcome is still unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CallOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub occurred_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(kind: EventKind, lead_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            lead_id: lead_id.into(),
            script_id: None,
            strategy: None,
            objective: None,
            outcome: None,
            confidence: None,
            occurred_at: Utc::now(),
        }
    }

    /// Event describing a script, tagged with its strategy and objective
    pub fn for_script(kind: EventKind, script: &PersonalizedScript) -> Self {
        Self::for_usage(kind, &ScriptUsage::from(script))
    }

    pub fn for_usage(kind: EventKind, usage: &ScriptUsage) -> Self {
        let mut event = Self::new(kind, usage.lead_id.clone());
        event.script_id = Some(usage.script_id.clone());
        event.strategy = Some(usage.strategy);
        event.objective = Some(usage.objective);
        event
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_objective(mut self, objective: CallObjective) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn with_outcome(mut self, outcome: Option<CallOutcome>) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Whether this event carries a terminal outcome
    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::OutcomeRecorded && self.outcome.is_some()
    }
}

/// Half-open reporting window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportingPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The last `days` days up to now
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now() + Duration::seconds(1);
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Roll-up for one strategy or objective bucket
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketPerformance {
    pub scripts_generated: u64,
    pub scripts_used: u64,
    /// Outcome events with a terminal result
    pub terminal_outcomes: u64,
    pub objectives_achieved: u64,
    pub successful_calls: u64,
    /// Over terminal outcomes only; `None` without any
    pub achievement_rate: Option<f64>,
    pub success_rate: Option<f64>,
    pub average_confidence: Option<f64>,
    pub average_call_duration_seconds: Option<f64>,
}

/// Performance report over a reporting period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalytics {
    pub period: ReportingPeriod,
    pub total_analyses: u64,
    pub total_scripts_generated: u64,
    pub total_scripts_used: u64,
    pub total_terminal_outcomes: u64,
    pub generation_failures: u64,
    pub late_discarded: u64,
    /// Events dropped before reaching the store because of overload
    pub dropped_events: u64,
    pub by_strategy: BTreeMap<Strategy, BucketPerformance>,
    pub by_objective: BTreeMap<CallObjective, BucketPerformance>,
    /// Strategy with the highest achievement rate, if any has outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_strategy: Option<Strategy>,
    pub generated_at: DateTime<Utc>,
}
