//! Boundary traits
//!
//! The engine talks to everything outside its own process through these:
//!
//! ```text
//!   GenerationBackend: structured prompt in, structured payload out
//!   LeadStore:         read-only lead, conversation and campaign records
//!   AnalyticsStore:    append-only event sink with period queries
//! ```

mod analytics_store;
mod generation;
mod lead_store;

pub use analytics_store::AnalyticsStore;
pub use generation::{
    GenerationBackend, GenerationConstraints, GenerationRequest, GenerationResponse,
    ResponseSchema,
};
pub use lead_store::LeadStore;
