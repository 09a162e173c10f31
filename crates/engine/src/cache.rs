//! Analysis cache keyed by lead id
//!
//! Entries carry a fingerprint of the context they were computed from, so a
//! caller can tell a stale analysis from a fresh one without trusting the
//! clock alone. Expired entries read as absent. Concurrent writers for the
//! same lead resolve last-write-wins.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use lead_engine_core::{ContextAnalysis, LeadContext};

use crate::telemetry;

#[derive(Debug, Clone)]
struct CacheEntry {
    analysis: ContextAnalysis,
    fingerprint: String,
    stored_at: Instant,
}

/// Hex sha256 over the context content, ignoring the capture timestamp
pub fn context_fingerprint(context: &LeadContext) -> String {
    let mut value = serde_json::to_value(context).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.remove("captured_at");
    }
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Time-bounded analysis cache
pub struct ContextCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached analysis if present and not expired
    pub fn get(&self, lead_id: &str) -> Option<ContextAnalysis> {
        let hit = self
            .entries
            .get(lead_id)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| e.analysis.clone());
        telemetry::record_cache_lookup(hit.is_some());
        tracing::debug!(lead_id, hit = hit.is_some(), "Analysis cache lookup");
        hit
    }

    /// Cached analysis only if it was computed from an identical context
    pub fn get_fresh(&self, lead_id: &str, fingerprint: &str) -> Option<ContextAnalysis> {
        let hit = self
            .entries
            .get(lead_id)
            .filter(|e| e.stored_at.elapsed() < self.ttl && e.fingerprint == fingerprint)
            .map(|e| e.analysis.clone());
        telemetry::record_cache_lookup(hit.is_some());
        tracing::debug!(lead_id, hit = hit.is_some(), "Fingerprinted analysis cache lookup");
        hit
    }

    pub fn put(&self, analysis: ContextAnalysis, fingerprint: String) {
        self.entries.insert(
            analysis.lead_id.clone(),
            CacheEntry {
                analysis,
                fingerprint,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for a lead; returns whether one existed
    pub fn invalidate(&self, lead_id: &str) -> bool {
        self.entries.remove(lead_id).is_some()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
