//! Core traits and types for the lead personalization engine
//!
//! This crate provides foundational types used across all other crates:
//! - Lead context snapshots and conversation summaries
//! - Context analysis (personality, style, strategy, confidence)
//! - Personalized call scripts with placeholder provenance
//! - A/B test definitions and computed results
//! - Analytics events and performance summaries
//! - Boundary traits (generation backend, lead store, analytics store)
//! - Error types

pub mod analysis;
pub mod analytics;
pub mod error;
pub mod experiment;
pub mod lead;
pub mod script;
pub mod traits;

pub use analysis::{CommunicationStyle, Confidence, ContextAnalysis, PersonalityProfile, Strategy};
pub use analytics::{
    AnalyticsEvent, BucketPerformance, CallOutcome, EventKind, PerformanceAnalytics,
    ReportingPeriod, ScriptUsage,
};
pub use error::{BackendError, EngineError, Result};
pub use experiment::{
    ABTest, ABTestResults, ABVariant, MetricKind, PrimaryMetric, TargetingCriteria, TestStatus,
    VariantResult,
};
pub use lead::{
    CampaignContext, ContactMethod, ConversationSummary, DecisionMakerLevel, InterestLevel,
    LeadContext, LeadRecord, LeadStatus, ObservedPreferences, QualificationState,
};
pub use script::{
    placeholder_tokens, CallObjective, ElementType, PersonalizedElement, PersonalizedScript,
    Provenance, ScriptSection, ScriptSections, ScriptWarning, SectionKind, StrategySource,
};

pub use traits::{
    AnalyticsStore, GenerationBackend, GenerationConstraints, GenerationRequest,
    GenerationResponse, LeadStore, ResponseSchema,
};
