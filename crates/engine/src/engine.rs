//! Personalization engine facade
//!
//! Wires aggregation, caching, analysis, experiment interception, script
//! generation and analytics into the operations callers use.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use lead_engine_config::EngineConfig;
use lead_engine_core::{
    AnalyticsEvent, BackendError, CallObjective, CallOutcome, ContextAnalysis, EngineError,
    EventKind, GenerationBackend, LeadContext, LeadStore, PersonalizedScript, Result, ScriptUsage,
    Strategy, StrategySource,
};

use crate::aggregator::LeadContextAggregator;
use crate::analyzer::ContextAnalyzer;
use crate::cache::context_fingerprint;
use crate::experiment::{observation_for, VariantAssignment};
use crate::fallback::fallback_script;
use crate::generator::{ScriptGenerator, ScriptOptions};
use crate::state::EngineState;
use crate::telemetry;

/// Analysis for a lead together with the context it was derived from
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedLead {
    pub context: LeadContext,
    pub analysis: ContextAnalysis,
    pub from_cache: bool,
}

/// One script request
#[derive(Debug, Clone)]
pub struct PersonalizationRequest {
    pub lead_id: String,
    pub objective: CallObjective,
    pub strategy: Option<Strategy>,
    pub include_objection_handling: Option<bool>,
    pub include_social_proof: Option<bool>,
    pub max_total_words: Option<u32>,
    /// Results arriving later than this are discarded
    pub deadline: Option<Duration>,
}

impl PersonalizationRequest {
    pub fn new(lead_id: impl Into<String>, objective: CallObjective) -> Self {
        Self {
            lead_id: lead_id.into(),
            objective,
            strategy: None,
            include_objection_handling: None,
            include_social_proof: None,
            max_total_words: None,
            deadline: None,
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

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn options(&self) -> ScriptOptions {
        ScriptOptions {
            objective: self.objective,
            strategy: self.strategy,
            include_objection_handling: self.include_objection_handling,
            include_social_proof: self.include_social_proof,
            max_total_words: self.max_total_words,
        }
    }
}

/// Result of a personalization request
///
/// `success=false` means personalization was unavailable; `script` is then
/// the generic fallback and `reason` says why.
#[derive(Debug, Clone, Serialize)]
pub struct PersonalizationOutcome {
    pub success: bool,
    pub script: PersonalizedScript,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ContextAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<VariantAssignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub from_cache: bool,
}

/// Effects of a run, applied only when its result is delivered
#[derive(Default)]
struct PendingEffects {
    /// Freshly computed analysis and the fingerprint it was derived from
    cache_entry: Option<(ContextAnalysis, String)>,
    events: Vec<AnalyticsEvent>,
    enrollment: Option<VariantAssignment>,
    fallback: bool,
}

struct PersonalizationRun {
    outcome: PersonalizationOutcome,
    effects: PendingEffects,
}

struct EngineInner {
    aggregator: LeadContextAggregator,
    analyzer: ContextAnalyzer,
    generator: ScriptGenerator,
    state: Arc<EngineState>,
}

/// Cheaply cloneable handle to the engine
#[derive(Clone)]
pub struct PersonalizationEngine {
    inner: Arc<EngineInner>,
}

impl PersonalizationEngine {
    pub fn new(
        store: Arc<dyn LeadStore>,
        backend: Arc<dyn GenerationBackend>,
        state: Arc<EngineState>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let analyzer = ContextAnalyzer::new(Arc::clone(&backend), config.analyzer.clone())?;
        let generator = ScriptGenerator::new(backend, config.script.clone());
        Ok(Self {
            inner: Arc::new(EngineInner {
                aggregator: LeadContextAggregator::new(store, &config.aggregator),
                analyzer,
                generator,
                state,
            }),
        })
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.inner.state
    }

    /// Analysis for a lead, served from cache while the lead data is unchanged
    pub async fn analyze_lead(&self, lead_id: &str) -> Result<AnalyzedLead> {
        let mut effects = PendingEffects::default();
        let analyzed = self.analyze_deferred(lead_id, &mut effects).await?;
        self.apply(effects, lead_id);
        Ok(analyzed)
    }

    async fn analyze_deferred(
        &self,
        lead_id: &str,
        effects: &mut PendingEffects,
    ) -> Result<AnalyzedLead> {
        let inner = &self.inner;
        let context = inner.aggregator.aggregate(lead_id).await?;
        let fingerprint = context_fingerprint(&context);

        if let Some(analysis) = inner.state.cache.get_fresh(lead_id, &fingerprint) {
            return Ok(AnalyzedLead {
                context,
                analysis,
                from_cache: true,
            });
        }

        let analysis = inner.analyzer.analyze(&context).await?;
        effects.events.push(
            AnalyticsEvent::new(EventKind::AnalysisCompleted, lead_id)
                .with_strategy(analysis.recommended_strategy)
                .with_confidence(analysis.overall_confidence().value()),
        );
        effects.cache_entry = Some((analysis.clone(), fingerprint));
        Ok(AnalyzedLead {
            context,
            analysis,
            from_cache: false,
        })
    }

    /// Drop any cached analysis and analyze again
    pub async fn refresh_analysis(&self, lead_id: &str) -> Result<AnalyzedLead> {
        let existed = self.inner.state.cache.invalidate(lead_id);
        tracing::debug!(lead_id, existed, "Analysis cache entry invalidated");
        self.analyze_lead(lead_id).await
    }

    /// Produce a script for a lead
    ///
    /// Unknown leads fail with `NotFound`. When analysis or generation is
    /// unavailable the outcome carries a fallback script with
    /// `success=false`. With a deadline, a late result is discarded and
    /// recorded in analytics, and the call fails with `DeadlineExceeded`.
    /// A discarded result leaves the cache, analytics and experiment
    /// participation untouched.
    pub async fn personalize(
        &self,
        request: PersonalizationRequest,
    ) -> Result<PersonalizationOutcome> {
        let Some(deadline) = request.deadline else {
            let run = self.run_personalize(&request).await?;
            return Ok(self.deliver(run, &request.lead_id));
        };

        let engine = self.clone();
        let lead_id = request.lead_id.clone();
        let objective = request.objective;
        let mut handle = tokio::spawn(async move { engine.run_personalize(&request).await });

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(joined) => {
                let run = joined.map_err(|e| {
                    EngineError::Backend(BackendError::Unavailable(format!(
                        "personalization task failed: {}",
                        e
                    )))
                })??;
                Ok(self.deliver(run, &lead_id))
            }
            Err(_) => {
                tracing::warn!(
                    lead_id = %lead_id,
                    deadline_ms = deadline.as_millis() as u64,
                    "Personalization missed its deadline"
                );
                let state = Arc::clone(&self.inner.state);
                tokio::spawn(async move {
                    if let Ok(Ok(run)) = handle.await {
                        telemetry::record_late_result();
                        state.analytics.record(
                            AnalyticsEvent::for_script(EventKind::LateDiscarded, &run.outcome.script)
                                .with_objective(objective),
                        );
                        tracing::debug!(lead_id = %lead_id, "Late personalization result discarded");
                    }
                });
                Err(EngineError::DeadlineExceeded)
            }
        }
    }

    async fn run_personalize(&self, request: &PersonalizationRequest) -> Result<PersonalizationRun> {
        let inner = &self.inner;
        let mut effects = PendingEffects::default();

        let analyzed = match self.analyze_deferred(&request.lead_id, &mut effects).await {
            Ok(analyzed) => analyzed,
            Err(e) => return Self::fall_back(e, request.objective, None, effects),
        };

        let assignment = if request.strategy.is_none() {
            inner
                .state
                .experiments
                .select_assignment(&analyzed.context, request.objective)
        } else {
            None
        };

        let script = match inner
            .generator
            .generate(
                &analyzed.context,
                &analyzed.analysis,
                &request.options(),
                assignment.as_ref(),
            )
            .await
        {
            Ok(script) => script,
            Err(e) => {
                return Self::fall_back(e, request.objective, Some(analyzed.analysis), effects)
            }
        };

        effects.events.push(
            AnalyticsEvent::for_script(EventKind::ScriptGenerated, &script)
                .with_confidence(analyzed.analysis.overall_confidence().value()),
        );
        effects.enrollment = assignment.clone();

        Ok(PersonalizationRun {
            outcome: PersonalizationOutcome {
                success: true,
                script,
                analysis: Some(analyzed.analysis),
                assignment,
                reason: None,
                from_cache: analyzed.from_cache,
            },
            effects,
        })
    }

    /// Turn an exhausted-retries failure into a fallback outcome
    fn fall_back(
        error: EngineError,
        objective: CallObjective,
        analysis: Option<ContextAnalysis>,
        mut effects: PendingEffects,
    ) -> Result<PersonalizationRun> {
        let Some(context) = error.fallback_context() else {
            return Err(error);
        };
        let reason = error.to_string();
        let script = fallback_script(context, objective, reason.clone());

        effects.fallback = true;
        effects.events.push(
            AnalyticsEvent::new(EventKind::GenerationFailed, context.lead_id.clone())
                .with_objective(objective),
        );

        Ok(PersonalizationRun {
            outcome: PersonalizationOutcome {
                success: false,
                script,
                analysis,
                assignment: None,
                reason: Some(reason),
                from_cache: false,
            },
            effects,
        })
    }

    fn deliver(&self, run: PersonalizationRun, lead_id: &str) -> PersonalizationOutcome {
        self.apply(run.effects, lead_id);
        run.outcome
    }

    /// Commit the effects of a delivered result
    fn apply(&self, effects: PendingEffects, lead_id: &str) {
        let state = &self.inner.state;
        if let Some((analysis, fingerprint)) = effects.cache_entry {
            state.cache.put(analysis, fingerprint);
        }
        if let Some(assignment) = effects.enrollment {
            if let Err(e) = state.experiments.assign(&assignment.test_id, lead_id) {
                tracing::warn!(
                    test_id = %assignment.test_id,
                    lead_id,
                    error = %e,
                    "Variant enrollment failed"
                );
            }
        }
        if effects.fallback {
            telemetry::record_fallback();
        }
        for event in effects.events {
            state.analytics.record(event);
        }
    }

    /// The caller used a delivered script on a call
    pub fn record_script_used(&self, usage: &ScriptUsage) {
        self.inner
            .state
            .analytics
            .record(AnalyticsEvent::for_usage(EventKind::ScriptUsed, usage));
    }

    /// Report how a call that used a script ended
    ///
    /// `None` records that the outcome is still unknown. A terminal outcome
    /// for an experiment-driven script also feeds the test's primary metric.
    pub fn record_outcome(&self, usage: &ScriptUsage, outcome: Option<CallOutcome>) -> Result<()> {
        let state = &self.inner.state;
        state.analytics.record(
            AnalyticsEvent::for_usage(EventKind::OutcomeRecorded, usage).with_outcome(outcome),
        );

        if let (StrategySource::Experiment { test_id, .. }, Some(outcome)) =
            (&usage.strategy_source, outcome)
        {
            let test = state.experiments.get_test(test_id)?;
            if let Some(value) = observation_for(test.primary_metric, &outcome) {
                state
                    .experiments
                    .record_observation(test_id, &usage.lead_id, value)?;
            }
        }
        Ok(())
    }
}
