use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What kind of routable unit a capability is.
///
/// Agents, skills and workflows share one record shape; the only
/// kind-specific datum is the workflow's minimum agent count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityKind {
    /// An autonomous agent persona (e.g. "frontend-developer").
    Agent,
    /// A narrow reusable skill an agent can apply.
    Skill,
    /// A multi-agent workflow; completing one requires at least
    /// `min_agents_required` distinct invoked agents.
    Workflow { min_agents_required: usize },
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Agent => "agent",
            CapabilityKind::Skill => "skill",
            CapabilityKind::Workflow { .. } => "workflow",
        }
    }
}

/// A routable unit in the capability catalog.
///
/// Immutable once loaded; the registry is read-only at request time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capability {
    /// Unique id, kebab-case (e.g. "security-auditor").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub description: String,
    pub kind: CapabilityKind,
    /// Domain tags; the first tag names the capability's family and is
    /// used when deciding whether two candidates are unrelated.
    pub domain_tags: BTreeSet<String>,
    /// Ordered trigger patterns. Multi-word patterns are matched as exact
    /// phrases and score higher than single keywords.
    pub trigger_patterns: Vec<String>,
    /// Whether this capability may be invoked during the Planning phase.
    #[serde(default)]
    pub planning_capable: bool,
}

impl Capability {
    pub fn new(id: &str, name: &str, description: &str, kind: CapabilityKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            domain_tags: BTreeSet::new(),
            trigger_patterns: Vec::new(),
            planning_capable: false,
        }
    }

    pub fn with_domains(mut self, tags: &[&str]) -> Self {
        self.domain_tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_triggers(mut self, patterns: &[&str]) -> Self {
        self.trigger_patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_planning(mut self, planning_capable: bool) -> Self {
        self.planning_capable = planning_capable;
        self
    }

    pub fn is_agent(&self) -> bool {
        matches!(self.kind, CapabilityKind::Agent)
    }

    pub fn is_skill(&self) -> bool {
        matches!(self.kind, CapabilityKind::Skill)
    }

    pub fn is_workflow(&self) -> bool {
        matches!(self.kind, CapabilityKind::Workflow { .. })
    }

    /// Family tag used for ambiguity checks: the first domain tag,
    /// falling back to the id for untagged capabilities.
    pub fn family(&self) -> &str {
        self.domain_tags
            .iter()
            .next()
            .map(|s| s.as_str())
            .unwrap_or(&self.id)
    }
}
