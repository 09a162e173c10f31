//! Read-only access to the external lead store

use async_trait::async_trait;

use crate::error::Result;
use crate::lead::{CampaignContext, ConversationSummary, LeadRecord};

/// Source of lead records, conversation summaries and campaign associations
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// `Ok(None)` when no record exists for the id
    async fn get_lead(&self, lead_id: &str) -> Result<Option<LeadRecord>>;

    /// Up to `limit` conversation summaries, in any order
    async fn recent_conversations(
        &self,
        lead_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>>;

    async fn campaign_for(&self, lead_id: &str) -> Result<Option<CampaignContext>>;
}
