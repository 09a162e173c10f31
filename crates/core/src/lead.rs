//! Lead records and the immutable context snapshot fed to analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::CommunicationStyle;

/// Pipeline status of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Nurturing,
    ProposalSent,
    Negotiating,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Nurturing => "nurturing",
            LeadStatus::ProposalSent => "proposal_sent",
            LeadStatus::Negotiating => "negotiating",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

/// Interest level observed by sales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestLevel {
    Low,
    Medium,
    High,
}

/// How much buying authority the contact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMakerLevel {
    Influencer,
    Recommender,
    DecisionMaker,
}

/// Preferred contact channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    Phone,
    Email,
    Sms,
    Video,
}

/// Lead record as read from the external lead store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_level: Option<InterestLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_maker_level: Option<DecisionMakerLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_contact_method: Option<ContactMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<CommunicationStyle>,
}

/// Summary of one past conversation with the lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_seconds: u32,
    /// Sentiment in [-1.0, 1.0]
    pub sentiment: f32,
    /// Engagement in [0, 100]
    pub engagement: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub objections: Vec<String>,
    #[serde(default)]
    pub buying_signals: Vec<String>,
}

impl ConversationSummary {
    /// Clamp sentiment and engagement into their declared ranges
    pub fn normalized(mut self) -> Self {
        self.sentiment = self.sentiment.clamp(-1.0, 1.0);
        self.engagement = self.engagement.clamp(0.0, 100.0);
        self
    }

    /// Whether the summary carries more than bare metrics
    pub fn is_rich(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
            || !self.objections.is_empty()
            || !self.buying_signals.is_empty()
    }
}

/// Campaign and product the lead is assigned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignContext {
    pub campaign_id: String,
    pub campaign_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_description: Option<String>,
    #[serde(default)]
    pub value_propositions: Vec<String>,
}

/// Qualification state of the lead
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualificationState {
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_level: Option<InterestLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_maker_level: Option<DecisionMakerLevel>,
}

/// Preferences observed in earlier interactions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservedPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_method: Option<ContactMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<CommunicationStyle>,
}

/// Immutable snapshot of everything known about a lead
///
/// Built fresh per request. Enrichment methods consume the value and return a
/// new one; nothing mutates a shared context in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadContext {
    pub lead_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Most recent first
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
    #[serde(default)]
    pub qualification: QualificationState,
    #[serde(default)]
    pub preferences: ObservedPreferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignContext>,
    pub captured_at: DateTime<Utc>,
}

impl LeadContext {
    /// Minimal context with identity only
    pub fn new(lead_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            lead_id: lead_id.into(),
            name: name.into(),
            company: None,
            industry: None,
            role: None,
            conversations: Vec::new(),
            qualification: QualificationState::default(),
            preferences: ObservedPreferences::default(),
            campaign: None,
            captured_at: Utc::now(),
        }
    }

    /// Context from a stored lead record (no history yet)
    pub fn from_record(record: LeadRecord) -> Self {
        Self {
            lead_id: record.id,
            name: record.name,
            company: record.company,
            industry: record.industry,
            role: record.role,
            conversations: Vec::new(),
            qualification: QualificationState {
                status: record.status,
                qualification_score: record.qualification_score,
                interest_level: record.interest_level,
                decision_maker_level: record.decision_maker_level,
            },
            preferences: ObservedPreferences {
                contact_method: record.preferred_contact_method,
                communication_style: record.communication_style,
            },
            campaign: None,
            captured_at: Utc::now(),
        }
    }

    /// Replace the conversation history, ordered most recent first
    pub fn with_conversations(mut self, mut conversations: Vec<ConversationSummary>) -> Self {
        conversations.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        self.conversations = conversations;
        self
    }

    pub fn with_campaign(mut self, campaign: Option<CampaignContext>) -> Self {
        self.campaign = campaign;
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_qualification(mut self, qualification: QualificationState) -> Self {
        self.qualification = qualification;
        self
    }

    pub fn with_preferences(mut self, preferences: ObservedPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn most_recent_conversation(&self) -> Option<&ConversationSummary> {
        self.conversations.first()
    }

    /// Mean sentiment over the history, if any
    pub fn average_sentiment(&self) -> Option<f32> {
        if self.conversations.is_empty() {
            return None;
        }
        let total: f32 = self.conversations.iter().map(|c| c.sentiment).sum();
        Some(total / self.conversations.len() as f32)
    }

    /// Mean engagement over the history, if any
    pub fn average_engagement(&self) -> Option<f32> {
        if self.conversations.is_empty() {
            return None;
        }
        let total: f32 = self.conversations.iter().map(|c| c.engagement).sum();
        Some(total / self.conversations.len() as f32)
    }

    /// Distinct objections across the history, most recent first
    pub fn objections(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for objection in self.conversations.iter().flat_map(|c| c.objections.iter()) {
            if !seen.contains(&objection.as_str()) {
                seen.push(objection.as_str());
            }
        }
        seen
    }

    /// Distinct buying signals across the history, most recent first
    pub fn buying_signals(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for signal in self.conversations.iter().flat_map(|c| c.buying_signals.iter()) {
            if !seen.contains(&signal.as_str()) {
                seen.push(signal.as_str());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn conversation(id: &str, hours_ago: i64) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            occurred_at: Utc::now() - Duration::hours(hours_ago),
            duration_seconds: 300,
            sentiment: 0.4,
            engagement: 70.0,
            summary: None,
            objections: vec!["price".to_string()],
            buying_signals: vec![],
        }
    }

    #[test]
    fn test_conversations_ordered_most_recent_first() {
        let ctx = LeadContext::new("lead-1", "Dana").with_conversations(vec![
            conversation("old", 48),
            conversation("newest", 1),
            conversation("mid", 10),
        ]);
        let ids: Vec<&str> = ctx.conversations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "mid", "old"]);
        assert_eq!(ctx.most_recent_conversation().unwrap().id, "newest");
    }

    #[test]
    fn test_record_keeps_missing_fields_absent() {
        let record = LeadRecord {
            id: "lead-2".into(),
            name: "Sam".into(),
            company: None,
            industry: Some("logistics".into()),
            role: None,
            status: LeadStatus::Contacted,
            qualification_score: None,
            interest_level: None,
            decision_maker_level: None,
            preferred_contact_method: None,
            communication_style: None,
        };
        let ctx = LeadContext::from_record(record);
        assert!(ctx.company.is_none());
        assert!(ctx.qualification.qualification_score.is_none());
        assert_eq!(ctx.industry.as_deref(), Some("logistics"));
        assert!(ctx.average_sentiment().is_none());
    }

    #[test]
    fn test_normalized_clamps_ranges() {
        let mut c = conversation("c", 1);
        c.sentiment = 3.0;
        c.engagement = -5.0;
        let c = c.normalized();
        assert_eq!(c.sentiment, 1.0);
        assert_eq!(c.engagement, 0.0);
    }

    #[test]
    fn test_objections_deduplicated() {
        let ctx = LeadContext::new("lead-1", "Dana")
            .with_conversations(vec![conversation("a", 1), conversation("b", 2)]);
        assert_eq!(ctx.objections(), vec!["price"]);
    }
}
