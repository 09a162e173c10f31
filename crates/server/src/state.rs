//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use lead_engine::PersonalizationEngine;
use lead_engine_config::Settings;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub engine: PersonalizationEngine,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(engine: PersonalizationEngine, settings: Settings) -> Self {
        Self {
            engine,
            settings: Arc::new(settings),
        }
    }
}
