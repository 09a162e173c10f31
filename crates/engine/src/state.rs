//! Shared mutable engine state
//!
//! Constructed once by the host and handed to the engine by `Arc`. Nothing in
//! the crate keeps process-global caches or counters.

use std::sync::Arc;

use lead_engine_config::EngineConfig;
use lead_engine_core::AnalyticsStore;

use crate::analytics::AnalyticsAggregator;
use crate::cache::ContextCache;
use crate::experiment::ABTestManager;

pub struct EngineState {
    pub cache: ContextCache,
    pub experiments: ABTestManager,
    pub analytics: AnalyticsAggregator,
}

impl EngineState {
    /// Must be called inside a Tokio runtime (spawns the analytics writer)
    pub fn new(config: &EngineConfig, analytics_store: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            cache: ContextCache::new(config.cache.ttl()),
            experiments: ABTestManager::new(config.ab_testing.clone()),
            analytics: AnalyticsAggregator::new(analytics_store, &config.analytics),
        }
    }
}
