use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single capability invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    /// The invocation finished after its run was already aborted. Kept
    /// for the audit trail, excluded from success-rate stats.
    Superseded,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Timeout => "timeout",
            Outcome::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Outcome::Success),
            "failure" => Some(Outcome::Failure),
            "timeout" => Some(Outcome::Timeout),
            "superseded" => Some(Outcome::Superseded),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one capability invocation.
///
/// Appended to the trace store in invocation-completion order. The only
/// field written after creation is `reward`, filled exactly once by
/// `emit_reward`; timeout spans are created with `reward = Some(0.0)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub task_type: String,
    pub query_text: String,
    pub selected_capabilities: Vec<String>,
    pub outcome: Outcome,
    /// Scalar in [0, 1]; None until the caller emits a reward.
    pub reward: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Opaque caller context captured at invocation time.
    pub context_snapshot: serde_json::Value,
}

/// Parameters for appending a new span. The store assigns the id and
/// timestamp unless a timestamp is supplied (tests backdate spans).
#[derive(Debug, Clone)]
pub struct NewSpan {
    pub task_type: String,
    pub query_text: String,
    pub selected_capabilities: Vec<String>,
    pub outcome: Outcome,
    pub reward: Option<f64>,
    pub context_snapshot: serde_json::Value,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewSpan {
    pub fn new(task_type: &str, query_text: &str, outcome: Outcome) -> Self {
        Self {
            task_type: task_type.to_string(),
            query_text: query_text.to_string(),
            selected_capabilities: Vec::new(),
            outcome,
            reward: None,
            context_snapshot: serde_json::Value::Null,
            timestamp: None,
        }
    }

    pub fn with_capabilities(mut self, ids: &[&str]) -> Self {
        self.selected_capabilities = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_reward(mut self, reward: f64) -> Self {
        self.reward = Some(reward);
        self
    }

    pub fn with_context(mut self, snapshot: serde_json::Value) -> Self {
        self.context_snapshot = snapshot;
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }
}

/// Aggregate statistics for one task type.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskStats {
    pub total: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_round_trip() {
        for o in [
            Outcome::Success,
            Outcome::Failure,
            Outcome::Timeout,
            Outcome::Superseded,
        ] {
            assert_eq!(Outcome::parse(o.as_str()), Some(o));
        }
        assert_eq!(Outcome::parse("bogus"), None);
    }

    #[test]
    fn test_new_span_builder() {
        let span = NewSpan::new("api_implementation", "add endpoint", Outcome::Success)
            .with_capabilities(&["backend-developer"])
            .with_reward(1.0);
        assert_eq!(span.selected_capabilities, vec!["backend-developer"]);
        assert_eq!(span.reward, Some(1.0));
        assert!(span.timestamp.is_none());
    }
}
