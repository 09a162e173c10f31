//! Metric names and recording helpers
//!
//! Recording is a no-op until a recorder is installed by the host process.

use std::time::Duration;

pub const CACHE_HITS: &str = "lead_engine_cache_hits_total";
pub const CACHE_MISSES: &str = "lead_engine_cache_misses_total";
pub const BACKEND_RETRIES: &str = "lead_engine_backend_retries_total";
pub const ANALYSIS_LATENCY: &str = "lead_engine_analysis_latency_ms";
pub const SCRIPT_LATENCY: &str = "lead_engine_script_latency_ms";
pub const ANALYTICS_DROPPED: &str = "lead_engine_analytics_dropped_total";
pub const LATE_RESULTS: &str = "lead_engine_late_results_total";
pub const AB_ASSIGNMENTS: &str = "lead_engine_ab_assignments_total";
pub const FALLBACK_SCRIPTS: &str = "lead_engine_fallback_scripts_total";

pub fn record_cache_lookup(hit: bool) {
    if hit {
        metrics::counter!(CACHE_HITS).increment(1);
    } else {
        metrics::counter!(CACHE_MISSES).increment(1);
    }
}

pub fn record_backend_retry(stage: &'static str) {
    metrics::counter!(BACKEND_RETRIES, "stage" => stage).increment(1);
}

pub fn record_analysis_latency(elapsed: Duration) {
    metrics::histogram!(ANALYSIS_LATENCY).record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_script_latency(elapsed: Duration) {
    metrics::histogram!(SCRIPT_LATENCY).record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_analytics_dropped() {
    metrics::counter!(ANALYTICS_DROPPED).increment(1);
}

pub fn record_late_result() {
    metrics::counter!(LATE_RESULTS).increment(1);
}

pub fn record_assignment(test_id: &str, variant_id: &str) {
    metrics::counter!(
        AB_ASSIGNMENTS,
        "test" => test_id.to_string(),
        "variant" => variant_id.to_string()
    )
    .increment(1);
}

pub fn record_fallback() {
    metrics::counter!(FALLBACK_SCRIPTS).increment(1);
}
