//! Analytics pipeline
//!
//! `record` never waits: events go through a bounded channel to a worker task
//! that appends them to the [`AnalyticsStore`] in batches. When the channel is
//! full the event is dropped and counted, so analytics can lose data under
//! overload but never slows generation down.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use lead_engine_config::AnalyticsConfig;
use lead_engine_core::{
    AnalyticsEvent, AnalyticsStore, BucketPerformance, EngineError, EventKind,
    PerformanceAnalytics, ReportingPeriod, Result,
};

use crate::telemetry;

/// Events written per store call at most
const MAX_BATCH: usize = 256;

enum Command {
    Record(AnalyticsEvent),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget event recorder with period summaries
pub struct AnalyticsAggregator {
    tx: mpsc::Sender<Command>,
    store: Arc<dyn AnalyticsStore>,
    dropped: Arc<AtomicU64>,
    default_period_days: i64,
}

impl AnalyticsAggregator {
    /// Spawn the writer task; must be called inside a Tokio runtime
    pub fn new(store: Arc<dyn AnalyticsStore>, config: &AnalyticsConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        tokio::spawn(run_writer(rx, Arc::clone(&store), Arc::clone(&dropped)));
        Self {
            tx,
            store,
            dropped,
            default_period_days: config.default_period_days,
        }
    }

    /// Queue an event; drops it when the queue is full
    pub fn record(&self, event: AnalyticsEvent) {
        if let Err(e) = self.tx.try_send(Command::Record(event)) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            telemetry::record_analytics_dropped();
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            tracing::debug!(reason, "Analytics event dropped");
        }
    }

    /// Events lost to overload or store failures since start
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until everything queued so far has reached the store
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .await
            .map_err(|_| EngineError::Store("analytics writer stopped".to_string()))?;
        ack_rx
            .await
            .map_err(|_| EngineError::Store("analytics writer stopped".to_string()))
    }

    /// Performance over a period, including everything recorded before the call
    pub async fn summarize(&self, period: &ReportingPeriod) -> Result<PerformanceAnalytics> {
        self.flush().await?;
        let events = self.store.events_in(period).await?;
        Ok(summarize_events(&events, *period, self.dropped_events()))
    }

    /// Summary over the configured default look-back
    pub async fn summarize_recent(&self) -> Result<PerformanceAnalytics> {
        self.summarize(&ReportingPeriod::last_days(self.default_period_days))
            .await
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<Command>,
    store: Arc<dyn AnalyticsStore>,
    dropped: Arc<AtomicU64>,
) {
    let mut batch = Vec::with_capacity(MAX_BATCH);
    while let Some(command) = rx.recv().await {
        let mut acks = Vec::new();
        let mut next = Some(command);
        while let Some(command) = next.take() {
            match command {
                Command::Record(event) => batch.push(event),
                Command::Flush(ack) => acks.push(ack),
            }
            if batch.len() < MAX_BATCH {
                next = rx.try_recv().ok();
            }
        }

        if !batch.is_empty() {
            let events = std::mem::take(&mut batch);
            let count = events.len() as u64;
            if let Err(e) = store.append(events).await {
                dropped.fetch_add(count, Ordering::Relaxed);
                tracing::warn!(error = %e, events = count, "Failed to persist analytics events");
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    tracing::debug!("Analytics writer stopped");
}

#[derive(Default)]
struct BucketAccumulator {
    performance: BucketPerformance,
    confidence_sum: f64,
    confidence_count: u64,
    duration_sum: f64,
    duration_count: u64,
}

impl BucketAccumulator {
    fn add(&mut self, event: &AnalyticsEvent) {
        let p = &mut self.performance;
        match event.kind {
            EventKind::ScriptGenerated => {
                p.scripts_generated += 1;
                if let Some(confidence) = event.confidence {
                    self.confidence_sum += confidence as f64;
                    self.confidence_count += 1;
                }
            }
            EventKind::ScriptUsed => p.scripts_used += 1,
            EventKind::OutcomeRecorded => {
                let Some(outcome) = event.outcome else {
                    return;
                };
                p.terminal_outcomes += 1;
                p.objectives_achieved += outcome.objective_achieved as u64;
                p.successful_calls += outcome.successful as u64;
                if let Some(seconds) = outcome.duration_seconds {
                    self.duration_sum += seconds as f64;
                    self.duration_count += 1;
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> BucketPerformance {
        let ratio = |num: u64, den: u64| (den > 0).then(|| num as f64 / den as f64);
        let mean = |sum: f64, n: u64| (n > 0).then(|| sum / n as f64);
        let mut p = self.performance;
        p.achievement_rate = ratio(p.objectives_achieved, p.terminal_outcomes);
        p.success_rate = ratio(p.successful_calls, p.terminal_outcomes);
        p.average_confidence = mean(self.confidence_sum, self.confidence_count);
        p.average_call_duration_seconds = mean(self.duration_sum, self.duration_count);
        p
    }
}

/// Roll events up by strategy and by objective independently
///
/// Rates use terminal outcomes only; outcome events without a result are
/// left out of both numerator and denominator.
pub fn summarize_events(
    events: &[AnalyticsEvent],
    period: ReportingPeriod,
    dropped_events: u64,
) -> PerformanceAnalytics {
    let mut by_strategy: BTreeMap<_, BucketAccumulator> = BTreeMap::new();
    let mut by_objective: BTreeMap<_, BucketAccumulator> = BTreeMap::new();
    let events: Vec<&AnalyticsEvent> = events
        .iter()
        .filter(|e| period.contains(e.occurred_at))
        .collect();
    let count = |kind: EventKind| events.iter().filter(|e| e.kind == kind).count() as u64;

    let total_analyses = count(EventKind::AnalysisCompleted);
    let total_scripts_generated = count(EventKind::ScriptGenerated);
    let total_scripts_used = count(EventKind::ScriptUsed);
    let generation_failures = count(EventKind::GenerationFailed);
    let late_discarded = count(EventKind::LateDiscarded);
    let total_terminal_outcomes = events.iter().filter(|e| e.is_terminal()).count() as u64;

    for event in &events {
        if let Some(strategy) = event.strategy {
            by_strategy.entry(strategy).or_default().add(event);
        }
        if let Some(objective) = event.objective {
            by_objective.entry(objective).or_default().add(event);
        }
    }

    let by_strategy: BTreeMap<_, _> = by_strategy
        .into_iter()
        .map(|(k, acc)| (k, acc.finish()))
        .collect();
    let by_objective = by_objective
        .into_iter()
        .map(|(k, acc)| (k, acc.finish()))
        .collect();

    let mut best_strategy = None;
    let mut best_rate = f64::MIN;
    for (strategy, performance) in &by_strategy {
        if let Some(rate) = performance.achievement_rate {
            if rate > best_rate {
                best_rate = rate;
                best_strategy = Some(*strategy);
            }
        }
    }

    PerformanceAnalytics {
        period,
        total_analyses,
        total_scripts_generated,
        total_scripts_used,
        total_terminal_outcomes,
        generation_failures,
        late_discarded,
        dropped_events,
        by_strategy,
        by_objective,
        best_strategy,
        generated_at: Utc::now(),
    }
}

/// Analytics store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsStore {
    events: RwLock<Vec<AnalyticsEvent>>,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn append(&self, events: Vec<AnalyticsEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }

    async fn events_in(&self, period: &ReportingPeriod) -> Result<Vec<AnalyticsEvent>> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| period.contains(e.occurred_at))
            .cloned()
            .collect())
    }
}
