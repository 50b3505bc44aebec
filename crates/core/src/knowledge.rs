use serde::{Deserialize, Serialize};

/// A curated knowledge record for a topic.
///
/// Mutated only through the knowledge store's proposal/confirm write
/// path. `best_practice` never transitions true -> false automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeItem {
    pub topic: String,
    pub content: String,
    /// Span ids backing this item.
    pub linked_spans: Vec<String>,
    pub best_practice: bool,
}

impl KnowledgeItem {
    pub fn new(topic: &str, content: &str) -> Self {
        Self {
            topic: topic.to_string(),
            content: content.to_string(),
            linked_spans: Vec::new(),
            best_practice: false,
        }
    }

    pub fn with_linked_spans(mut self, span_ids: &[&str]) -> Self {
        self.linked_spans = span_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_best_practice(mut self, flag: bool) -> Self {
        self.best_practice = flag;
        self
    }
}

/// Status of a pending knowledge write proposal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Confirmed => "confirmed",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProposalStatus::Pending),
            "confirmed" => Some(ProposalStatus::Confirmed),
            "rejected" => Some(ProposalStatus::Rejected),
            _ => None,
        }
    }
}

/// A proposed knowledge write awaiting external confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeProposal {
    pub proposal_id: String,
    pub item: KnowledgeItem,
    pub status: ProposalStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
