//! Lead personalization engine
//!
//! Turns stored lead history into a behavioral profile, a recommended
//! strategy and a personalized call script, and runs strategy experiments.
//!
//! ```text
//! Aggregator -> Cache? -> Analyzer -> (A/B interception) -> Generator -> caller
//!                                          \-> Analytics (async, lossy)
//! ```
//!
//! Shared mutable state (analysis cache, experiments, analytics queue) lives
//! in an explicitly constructed [`EngineState`] owned by the caller.

pub mod aggregator;
pub mod analytics;
pub mod analyzer;
pub mod cache;
pub mod engine;
pub mod experiment;
pub mod fallback;
pub mod generator;
mod retry;
pub mod state;
pub mod stats;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use aggregator::LeadContextAggregator;
pub use analytics::{summarize_events, AnalyticsAggregator, InMemoryAnalyticsStore};
pub use analyzer::{evidence_ceiling, ContextAnalyzer, PlausibilityTable};
pub use cache::{context_fingerprint, ContextCache};
pub use engine::{AnalyzedLead, PersonalizationEngine, PersonalizationOutcome, PersonalizationRequest};
pub use experiment::{assign_variant, ABTestManager, AssignmentRecord, NewABTest, VariantAssignment};
pub use fallback::fallback_script;
pub use generator::{resolve_strategy, ScriptGenerator, ScriptOptions};
pub use state::EngineState;
pub use store::{InMemoryLeadStore, LeadFixture};
