//! Lead context aggregation
//!
//! Joins the lead record, recent conversation summaries and campaign
//! association into one immutable [`LeadContext`]. Missing optional fields
//! stay absent; nothing is defaulted or guessed here.

use std::sync::Arc;

use lead_engine_config::AggregatorConfig;
use lead_engine_core::{EngineError, LeadContext, LeadStore, Result};

/// Builds [`LeadContext`] snapshots from a [`LeadStore`]
pub struct LeadContextAggregator {
    store: Arc<dyn LeadStore>,
    max_conversations: usize,
}

impl LeadContextAggregator {
    pub fn new(store: Arc<dyn LeadStore>, config: &AggregatorConfig) -> Self {
        Self {
            store,
            max_conversations: config.max_conversations,
        }
    }

    /// Fresh context for a lead
    ///
    /// Fails with `NotFound` when the store has no record. A lead without
    /// history yields an empty conversation list, not an error.
    pub async fn aggregate(&self, lead_id: &str) -> Result<LeadContext> {
        let record = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(lead_id.to_string()))?;

        let conversations = self
            .store
            .recent_conversations(lead_id, self.max_conversations)
            .await?
            .into_iter()
            .map(|c| c.normalized())
            .collect::<Vec<_>>();
        let campaign = self.store.campaign_for(lead_id).await?;

        let mut context = LeadContext::from_record(record)
            .with_conversations(conversations)
            .with_campaign(campaign);
        context.conversations.truncate(self.max_conversations);

        tracing::debug!(
            lead_id,
            conversations = context.conversations.len(),
            has_campaign = context.campaign.is_some(),
            "Aggregated lead context"
        );
        Ok(context)
    }
}
