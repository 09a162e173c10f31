use async_trait::async_trait;

use crate::analytics::{AnalyticsEvent, ReportingPeriod};
use crate::error::Result;

/// Append-only analytics event sink
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn append(&self, events: Vec<AnalyticsEvent>) -> Result<()>;

    /// Events whose `occurred_at` falls within the period
    async fn events_in(&self, period: &ReportingPeriod) -> Result<Vec<AnalyticsEvent>>;
}
