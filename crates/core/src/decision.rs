use serde::{Deserialize, Serialize};

/// When the work should happen, inferred from urgency wording.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    Normal,
    Background,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Urgent => write!(f, "urgent"),
            Priority::Normal => write!(f, "normal"),
            Priority::Background => write!(f, "background"),
        }
    }
}

/// What the request is fundamentally trying to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    /// Build something new.
    Create,
    /// Extend or improve something that exists.
    Enhance,
    /// Repair broken behavior.
    Fix,
    /// Review, audit or explain without changing anything.
    Analyze,
    /// Operational work: deploy, configure, migrate.
    Operate,
    /// No goal keyword matched.
    General,
}

impl std::fmt::Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Goal::Create => write!(f, "create"),
            Goal::Enhance => write!(f, "enhance"),
            Goal::Fix => write!(f, "fix"),
            Goal::Analyze => write!(f, "analyze"),
            Goal::Operate => write!(f, "operate"),
            Goal::General => write!(f, "general"),
        }
    }
}

/// The routing decision for one request, framed as 5W1H so each
/// dimension is a testable field.
///
/// Created once per request by the decision engine and never mutated.
/// `who` holding more than one agent means Orchestration Mode: the run
/// cannot complete until at least the configured minimum of distinct
/// agents has been invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingDecision {
    pub request_id: String,
    pub when_priority: Priority,
    pub where_scope: String,
    pub what_goal: Goal,
    /// Selected agent capability ids, ranked.
    pub who: Vec<String>,
    /// Selected skill capability ids, ranked.
    pub how: Vec<String>,
    pub why_rationale: String,
    /// False when the adaptive ranker was unavailable and scores were
    /// used unweighted.
    pub weighted: bool,
    /// [0, 1]; margin of the winning score over the runner-up.
    pub confidence: f64,
}

impl RoutingDecision {
    /// More than one agent selected: the minimum-agent completion gate
    /// applies.
    pub fn is_orchestration(&self) -> bool {
        self.who.len() > 1
    }

    pub fn primary_agent(&self) -> Option<&str> {
        self.who.first().map(|s| s.as_str())
    }
}
