//! End-to-end engine scenarios against a scripted generation backend

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lead_engine::{
    assign_variant, EngineState, InMemoryAnalyticsStore, InMemoryLeadStore, LeadFixture,
    NewABTest, PersonalizationEngine, PersonalizationRequest,
};
use lead_engine_config::EngineConfig;
use lead_engine_core::{
    placeholder_tokens, ABVariant, BackendError, CallObjective, CallOutcome, ConversationSummary,
    EngineError, GenerationBackend, GenerationRequest, GenerationResponse, InterestLevel,
    LeadRecord, LeadStatus, PrimaryMetric, Provenance, ResponseSchema, ScriptUsage, Strategy,
    StrategySource, TargetingCriteria, TestStatus,
};

/// Answers by schema; honors the objection-handling constraint
struct RoutingBackend {
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl RoutingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    fn calls(&self, schema: ResponseSchema) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.schema == schema)
            .count()
    }

    fn last_script_request(&self) -> Option<GenerationRequest> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|r| r.schema == ResponseSchema::PersonalizedScript)
            .cloned()
    }
}

fn section(content: &str, seconds: u32, elements: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "content": content,
        "key_points": [],
        "estimated_duration_seconds": seconds,
        "personalized_elements": elements,
    })
}

fn analysis_payload() -> serde_json::Value {
    serde_json::json!({
        "personality_profile": "analytical",
        "communication_style": "technical",
        "recommended_strategy": "consultative",
        "value_drivers": ["predictable costs", "integration effort"],
        "objection_patterns": ["price", "switching risk"],
        "key_talking_points": ["TCO comparison", "API coverage", "pilot plan"],
        "avoidance_topics": ["hard deadlines"],
        "profile_confidence": 92,
        "recommendation_confidence": 80,
    })
}

fn script_payload(include_objection_handling: bool) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "estimated_duration_seconds": 0,
        "opening": section(
            "Hi {{lead_name}}, I'm calling about how {{company}} handles {{pain_point}}.",
            30,
            serde_json::json!([
                {"element_type": "pain_point", "placeholder": "{{pain_point}}",
                 "value": "route planning", "confidence": 100, "provenance": "ai_inference"},
                {"element_type": "custom", "placeholder": "{{unused}}",
                 "value": "leftover", "confidence": 40, "provenance": "ai_inference"}
            ]),
        ),
        "discovery": section("What does a typical week of planning look like?", 90, serde_json::json!([])),
        "presentation": section(
            "Teams in {{industry}} use us to cut planning time in half.",
            60,
            serde_json::json!([
                {"element_type": "industry", "placeholder": "industry",
                 "value": "logistics", "confidence": 90, "provenance": "lead_data"}
            ]),
        ),
        "closing": section("Would a short pilot next month make sense?", 30, serde_json::json!([])),
    });
    if include_objection_handling {
        payload["objection_handling"] =
            section("On price, most teams recover the cost within a quarter.", 45, serde_json::json!([]));
    }
    payload
}

#[async_trait]
impl GenerationBackend for RoutingBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let payload = match request.schema {
            ResponseSchema::ContextAnalysis => analysis_payload(),
            ResponseSchema::PersonalizedScript => script_payload(
                request
                    .constraints
                    .map_or(true, |c| c.include_objection_handling),
            ),
        };
        Ok(GenerationResponse {
            payload: payload.to_string(),
            model: "routing".into(),
            latency_ms: 1,
        })
    }

    fn name(&self) -> &str {
        "routing"
    }
}

fn record(id: &str) -> LeadRecord {
    LeadRecord {
        id: id.to_string(),
        name: "Dana Reyes".to_string(),
        company: Some("Northwind".to_string()),
        industry: Some("logistics".to_string()),
        role: None,
        status: LeadStatus::Qualified,
        qualification_score: None,
        interest_level: None,
        decision_maker_level: None,
        preferred_contact_method: None,
        communication_style: None,
    }
}

fn rich_conversations() -> Vec<ConversationSummary> {
    (0..5)
        .map(|i| ConversationSummary {
            id: format!("conv-{}", i),
            occurred_at: Utc::now() - ChronoDuration::days(i * 7),
            duration_seconds: 900,
            sentiment: 0.4,
            engagement: 75.0,
            summary: Some("Walked through current routing spreadsheets".to_string()),
            objections: vec!["price".to_string()],
            buying_signals: vec!["asked for a pilot".to_string()],
        })
        .collect()
}

fn lead_store() -> Arc<InMemoryLeadStore> {
    let mut store = InMemoryLeadStore::new();
    store.insert(LeadFixture {
        record: record("cold"),
        conversations: vec![],
        campaign: None,
    });
    let mut warm = record("warm");
    warm.qualification_score = Some(70.0);
    warm.interest_level = Some(InterestLevel::High);
    store.insert(LeadFixture {
        record: warm,
        conversations: rich_conversations(),
        campaign: None,
    });
    for i in 0..50 {
        store.insert(LeadFixture {
            record: record(&format!("lead-{}", i)),
            conversations: vec![],
            campaign: None,
        });
    }
    Arc::new(store)
}

fn engine_with(backend: Arc<RoutingBackend>) -> PersonalizationEngine {
    let config = EngineConfig::default();
    let state = Arc::new(EngineState::new(
        &config,
        Arc::new(InMemoryAnalyticsStore::new()),
    ));
    PersonalizationEngine::new(lead_store(), backend, state, &config).unwrap()
}

fn experiment(min_sample_size: u32) -> NewABTest {
    let variant = |id: &str, control: bool, strategy: Strategy| ABVariant {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        is_control: control,
        strategy,
        include_objection_handling: None,
        include_social_proof: None,
    };
    NewABTest {
        id: Some("consultative-vs-urgency".to_string()),
        name: "Consultative vs urgency".to_string(),
        description: String::new(),
        variants: vec![
            variant("control", true, Strategy::Consultative),
            variant("urgency", false, Strategy::Urgency),
        ],
        traffic_split: Some(BTreeMap::from([
            ("control".to_string(), 50.0),
            ("urgency".to_string(), 50.0),
        ])),
        targeting: TargetingCriteria::default(),
        primary_metric: PrimaryMetric::ObjectiveAchievementRate,
        min_sample_size: Some(min_sample_size),
        confidence_level: None,
        measurement_window_hours: Some(0),
    }
}

#[tokio::test]
async fn analysis_is_served_from_cache_within_ttl() {
    let backend = RoutingBackend::new();
    let engine = engine_with(backend.clone());

    let first = engine.analyze_lead("warm").await.unwrap();
    let second = engine.analyze_lead("warm").await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.analysis, second.analysis);
    assert_eq!(backend.calls(ResponseSchema::ContextAnalysis), 1);

    let refreshed = engine.refresh_analysis("warm").await.unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(backend.calls(ResponseSchema::ContextAnalysis), 2);
}

#[tokio::test]
async fn every_placeholder_has_exactly_one_element() {
    let engine = engine_with(RoutingBackend::new());
    let outcome = engine
        .personalize(PersonalizationRequest::new("warm", CallObjective::Discovery))
        .await
        .unwrap();
    assert!(outcome.success);

    for section in outcome.script.sections.in_order() {
        let tokens = placeholder_tokens(&section.content);
        for token in &tokens {
            let matching = section
                .personalized_elements
                .iter()
                .filter(|e| &e.placeholder == token)
                .count();
            assert_eq!(matching, 1, "token {} in {:?}", token, section.kind);
        }
        for element in &section.personalized_elements {
            assert!(tokens.contains(&element.placeholder), "unused {}", element.placeholder);
        }
        assert!(!section.rendered().contains("{{"));
    }
    // headline of zero is replaced by the section total
    assert_eq!(
        outcome.script.estimated_duration_seconds,
        outcome.script.section_duration_seconds
    );
}

#[tokio::test]
async fn confidences_stay_in_bounds() {
    let engine = engine_with(RoutingBackend::new());
    let outcome = engine
        .personalize(PersonalizationRequest::new("warm", CallObjective::Discovery))
        .await
        .unwrap();

    let analysis = outcome.analysis.unwrap();
    for c in [analysis.profile_confidence, analysis.recommendation_confidence] {
        assert!((0.0..=100.0).contains(&c.value()));
    }
    for element in outcome.script.elements() {
        assert!((0.0..=100.0).contains(&element.confidence.value()));
        if element.provenance == Provenance::AiInference {
            assert!(element.confidence.value() < 100.0);
        }
    }
}

#[tokio::test]
async fn cold_lead_reports_low_profile_confidence() {
    let engine = engine_with(RoutingBackend::new());
    let cold = engine.analyze_lead("cold").await.unwrap().analysis;
    let warm = engine.analyze_lead("warm").await.unwrap().analysis;

    assert!(cold.profile_confidence.value() <= 40.0);
    assert!(cold.evidence_capped);
    assert!(warm.profile_confidence.value() - cold.profile_confidence.value() >= 30.0);
}

#[tokio::test]
async fn objection_handling_toggle_removes_section() {
    let backend = RoutingBackend::new();
    let engine = engine_with(backend.clone());
    let outcome = engine
        .personalize(
            PersonalizationRequest::new("warm", CallObjective::FollowUp)
                .with_objection_handling(false),
        )
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(outcome.script.sections.objection_handling.is_none());
    assert_eq!(outcome.script.sections.in_order().len(), 4);
    let json = serde_json::to_value(&outcome.script).unwrap();
    assert!(json["sections"].get("objection_handling").is_none());

    let request = backend.last_script_request().unwrap();
    assert!(!request.constraints.unwrap().include_objection_handling);
}

#[tokio::test]
async fn explicit_strategy_beats_variant_and_recommendation() {
    let engine = engine_with(RoutingBackend::new());
    let experiments = &engine.state().experiments;
    experiments.create_test(experiment(100)).unwrap();
    experiments.start_test("consultative-vs-urgency").unwrap();

    let explicit = engine
        .personalize(
            PersonalizationRequest::new("warm", CallObjective::Closing)
                .with_strategy(Strategy::Educational),
        )
        .await
        .unwrap();
    assert_eq!(explicit.script.strategy, Strategy::Educational);
    assert_eq!(explicit.script.strategy_source, StrategySource::Explicit);
    assert!(explicit.assignment.is_none());

    let assigned = engine
        .personalize(PersonalizationRequest::new("warm", CallObjective::Closing))
        .await
        .unwrap();
    let assignment = assigned.assignment.unwrap();
    assert_eq!(assigned.script.strategy, assignment.strategy);
    assert!(matches!(
        assigned.script.strategy_source,
        StrategySource::Experiment { .. }
    ));

    experiments.pause_test("consultative-vs-urgency").unwrap();
    let recommended = engine
        .personalize(PersonalizationRequest::new("warm", CallObjective::Closing))
        .await
        .unwrap();
    assert_eq!(recommended.script.strategy, Strategy::Consultative);
    assert_eq!(recommended.script.strategy_source, StrategySource::Recommendation);
}

#[tokio::test]
async fn variant_assignment_is_stable() {
    let engine = engine_with(RoutingBackend::new());
    let experiments = &engine.state().experiments;
    experiments.create_test(experiment(100)).unwrap();
    let test = experiments.start_test("consultative-vs-urgency").unwrap();

    for i in 0..10 {
        let lead_id = format!("lead-{}", i);
        let outcome = engine
            .personalize(PersonalizationRequest::new(lead_id.clone(), CallObjective::Discovery))
            .await
            .unwrap();
        let assignment = outcome.assignment.unwrap();
        let expected = assign_variant(&test, &lead_id).unwrap();
        assert_eq!(assignment.variant_id, expected.id);
        assert_eq!(outcome.script.strategy, expected.strategy);
    }
}

#[tokio::test]
async fn significance_withheld_below_minimum_sample() {
    let engine = engine_with(RoutingBackend::new());
    let experiments = &engine.state().experiments;
    experiments.create_test(experiment(100)).unwrap();
    experiments.start_test("consultative-vs-urgency").unwrap();

    for i in 0..10 {
        let outcome = engine
            .personalize(PersonalizationRequest::new(format!("lead-{}", i), CallObjective::Discovery))
            .await
            .unwrap();
        let usage = ScriptUsage::from(&outcome.script);
        let achieved = outcome.script.strategy == Strategy::Urgency;
        engine
            .record_outcome(
                &usage,
                Some(CallOutcome {
                    objective_achieved: achieved,
                    successful: true,
                    duration_seconds: Some(240),
                    engagement: None,
                    sentiment: None,
                }),
            )
            .unwrap();
    }

    let results = experiments.results("consultative-vs-urgency").unwrap();
    assert_eq!(results.total_participants, 10);
    assert!(!results.minimum_sample_reached);
    assert!(!results.statistical_significance);
    assert!(results.winning_variant.is_none());
    let observed: u32 = results.variants.iter().map(|v| v.observations).sum();
    assert_eq!(observed, 10);
}

#[tokio::test]
async fn late_results_are_discarded_and_counted() {
    let engine = engine_with(RoutingBackend::slow(Duration::from_millis(100)));
    let experiments = &engine.state().experiments;
    experiments.create_test(experiment(100)).unwrap();
    experiments.start_test("consultative-vs-urgency").unwrap();

    let err = engine
        .personalize(
            PersonalizationRequest::new("warm", CallObjective::Discovery)
                .with_deadline(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded));

    // analysis and script calls finish in the background
    tokio::time::sleep(Duration::from_millis(500)).await;
    let summary = engine.state().analytics.summarize_recent().await.unwrap();
    assert_eq!(summary.late_discarded, 1);
    assert_eq!(summary.total_scripts_generated, 0);
    assert_eq!(summary.total_analyses, 0);
    assert!(summary
        .by_strategy
        .values()
        .all(|performance| performance.scripts_generated == 0));

    // nothing the late run computed was applied
    assert!(experiments
        .assignments("consultative-vs-urgency")
        .unwrap()
        .is_empty());
    assert!(!engine.analyze_lead("warm").await.unwrap().from_cache);
}

#[tokio::test]
async fn on_time_result_applies_its_effects() {
    let engine = engine_with(RoutingBackend::new());
    let experiments = &engine.state().experiments;
    experiments.create_test(experiment(100)).unwrap();
    experiments.start_test("consultative-vs-urgency").unwrap();

    let outcome = engine
        .personalize(
            PersonalizationRequest::new("warm", CallObjective::Discovery)
                .with_deadline(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.assignment.is_some());

    let summary = engine.state().analytics.summarize_recent().await.unwrap();
    assert_eq!(summary.total_scripts_generated, 1);
    assert_eq!(summary.late_discarded, 0);
    assert_eq!(
        experiments.assignments("consultative-vs-urgency").unwrap().len(),
        1
    );
    assert!(engine.analyze_lead("warm").await.unwrap().from_cache);
}

#[tokio::test]
async fn experiment_completes_once_sample_and_window_are_met() {
    let engine = engine_with(RoutingBackend::new());
    let experiments = &engine.state().experiments;
    experiments.create_test(experiment(5)).unwrap();
    experiments.start_test("consultative-vs-urgency").unwrap();

    for i in 0..12 {
        let outcome = engine
            .personalize(PersonalizationRequest::new(format!("lead-{}", i), CallObjective::Discovery))
            .await
            .unwrap();
        assert_eq!(outcome.assignment.is_some(), i < 5, "lead-{}", i);
    }

    let test = experiments.get_test("consultative-vs-urgency").unwrap();
    assert_eq!(test.status, TestStatus::Completed);
    assert_eq!(
        experiments.assignments("consultative-vs-urgency").unwrap().len(),
        5
    );
}

#[tokio::test]
async fn unknown_lead_is_fatal() {
    let backend = RoutingBackend::new();
    let engine = engine_with(backend.clone());
    let err = engine.analyze_lead("nobody").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(backend.calls(ResponseSchema::ContextAnalysis), 0);
}
