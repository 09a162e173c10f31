//! In-memory lead store backed by a YAML fixture

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use lead_engine_core::{
    CampaignContext, ConversationSummary, EngineError, LeadRecord, LeadStore, Result,
};

/// One lead in a fixture file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadFixture {
    #[serde(flatten)]
    pub record: LeadRecord,
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignContext>,
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    leads: Vec<LeadFixture>,
}

/// Lead store held entirely in memory
///
/// Used by the server binary for local runs and by tests. Production
/// deployments plug their CRM behind [`LeadStore`] instead.
#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    leads: HashMap<String, LeadFixture>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lead(mut self, fixture: LeadFixture) -> Self {
        self.insert(fixture);
        self
    }

    pub fn insert(&mut self, fixture: LeadFixture) {
        self.leads.insert(fixture.record.id.clone(), fixture);
    }

    /// Parse a `leads:` YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: FixtureFile = serde_yaml::from_str(yaml)
            .map_err(|e| EngineError::Store(format!("invalid lead fixture: {}", e)))?;
        let mut store = Self::new();
        for fixture in file.leads {
            store.insert(fixture);
        }
        Ok(store)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Store(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_yaml_str(&yaml)?;
        tracing::info!(path = %path.display(), leads = store.len(), "Loaded lead fixture");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn get_lead(&self, lead_id: &str) -> Result<Option<LeadRecord>> {
        Ok(self.leads.get(lead_id).map(|f| f.record.clone()))
    }

    async fn recent_conversations(
        &self,
        lead_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let Some(fixture) = self.leads.get(lead_id) else {
            return Ok(Vec::new());
        };
        let mut conversations = fixture.conversations.clone();
        conversations.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        conversations.truncate(limit);
        Ok(conversations)
    }

    async fn campaign_for(&self, lead_id: &str) -> Result<Option<CampaignContext>> {
        Ok(self.leads.get(lead_id).and_then(|f| f.campaign.clone()))
    }
}
