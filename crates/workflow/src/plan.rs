use chrono::{DateTime, Utc};
use conductor_core::RoutingDecision;
use serde::{Deserialize, Serialize};

/// One step of a plan, tied to the capability that will execute it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: usize,
    pub capability_id: String,
    pub description: String,
    /// Indices of steps that must finish first.
    pub depends_on: Vec<usize>,
}

/// The artifact produced by the planning phase and shown at the
/// approval gate. Rejected plans are discarded wholesale and rebuilt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanArtifact {
    pub request_id: String,
    pub steps: Vec<PlanStep>,
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PlanArtifact {
    /// Derive a plan from a routing decision: one step per selected
    /// agent, then one per skill depending on all agent steps.
    pub fn from_decision(decision: &RoutingDecision, query: &str) -> Self {
        let mut steps = Vec::new();
        for agent in &decision.who {
            steps.push(PlanStep {
                index: steps.len(),
                capability_id: agent.clone(),
                description: format!("{}: {}", agent, query),
                depends_on: Vec::new(),
            });
        }
        let agent_indices: Vec<usize> = (0..steps.len()).collect();
        for skill in &decision.how {
            steps.push(PlanStep {
                index: steps.len(),
                capability_id: skill.clone(),
                description: format!("{}: {}", skill, query),
                depends_on: agent_indices.clone(),
            });
        }
        Self {
            request_id: decision.request_id.clone(),
            steps,
            notes: vec![decision.why_rationale.clone()],
            created_at: Utc::now(),
        }
    }

    /// Group steps into dependency layers. Steps inside one batch have
    /// no ordering between each other and may run concurrently.
    pub fn batches(&self) -> Vec<Vec<&PlanStep>> {
        let mut done: Vec<bool> = vec![false; self.steps.len()];
        let mut batches = Vec::new();
        while done.iter().any(|d| !d) {
            let ready: Vec<&PlanStep> = self
                .steps
                .iter()
                .filter(|s| !done[s.index] && s.depends_on.iter().all(|&d| done[d]))
                .collect();
            if ready.is_empty() {
                // Dependency cycle; run the remainder as one batch
                // rather than spinning.
                let rest: Vec<&PlanStep> =
                    self.steps.iter().filter(|s| !done[s.index]).collect();
                for s in &rest {
                    done[s.index] = true;
                }
                batches.push(rest);
                break;
            }
            for s in &ready {
                done[s.index] = true;
            }
            batches.push(ready);
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{Goal, Priority};

    fn decision(who: &[&str], how: &[&str]) -> RoutingDecision {
        RoutingDecision {
            request_id: "req-1".to_string(),
            when_priority: Priority::Normal,
            where_scope: "project".to_string(),
            what_goal: Goal::Create,
            who: who.iter().map(|s| s.to_string()).collect(),
            how: how.iter().map(|s| s.to_string()).collect(),
            why_rationale: "test".to_string(),
            weighted: true,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_agents_batch_before_skills() {
        let plan = PlanArtifact::from_decision(
            &decision(&["frontend-developer", "backend-developer"], &["test-writer"]),
            "build it",
        );
        let batches = plan.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1][0].capability_id, "test-writer");
    }

    #[test]
    fn test_single_agent_single_batch() {
        let plan = PlanArtifact::from_decision(&decision(&["frontend-developer"], &[]), "ui");
        let batches = plan.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }
}
