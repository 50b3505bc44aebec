use conductor_core::{Capability, CapabilityKind, Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Read-only capability catalog.
///
/// Loaded once at startup from a YAML file (or the built-in catalog)
/// and never mutated afterwards; share it behind an `Arc`.
pub struct CapabilityRegistry {
    capabilities: Vec<Capability>,
    by_id: HashMap<String, usize>,
    fallback_id: String,
}

impl CapabilityRegistry {
    /// Build a registry from an explicit capability list. The fallback
    /// capability must be present in the list.
    pub fn from_capabilities(capabilities: Vec<Capability>, fallback_id: &str) -> Result<Self> {
        let mut by_id = HashMap::new();
        for (idx, cap) in capabilities.iter().enumerate() {
            if by_id.insert(cap.id.clone(), idx).is_some() {
                return Err(Error::Registry(format!("Duplicate capability id: {}", cap.id)));
            }
        }
        if !by_id.contains_key(fallback_id) {
            return Err(Error::Registry(format!(
                "Fallback capability '{}' not in catalog",
                fallback_id
            )));
        }
        Ok(Self {
            capabilities,
            by_id,
            fallback_id: fallback_id.to_string(),
        })
    }

    /// Load the catalog from a YAML file.
    pub fn load(path: &Path, fallback_id: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let capabilities: Vec<Capability> = serde_yaml::from_str(&content)
            .map_err(|e| Error::Registry(format!("Failed to parse {}: {}", path.display(), e)))?;
        info!(count = capabilities.len(), path = %path.display(), "Loaded capability catalog");
        Self::from_capabilities(capabilities, fallback_id)
    }

    /// Load from a YAML file if it exists, otherwise use the built-in
    /// catalog.
    pub fn load_or_builtin(path: &Path, fallback_id: &str) -> Result<Self> {
        if path.exists() {
            Self::load(path, fallback_id)
        } else {
            debug!("No catalog file, using built-in capabilities");
            Self::from_capabilities(builtin_capabilities(), fallback_id)
        }
    }

    pub fn list_capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn get(&self, id: &str) -> Option<&Capability> {
        self.by_id.get(id).map(|&idx| &self.capabilities[idx])
    }

    /// The generalist capability used when routing cannot settle on a
    /// specialist.
    pub fn fallback(&self) -> &Capability {
        // Presence is validated at construction.
        &self.capabilities[self.by_id[&self.fallback_id]]
    }

    /// Agents sharing at least one of the given domain tags, in catalog
    /// order.
    pub fn agents_in_domains<'a>(
        &'a self,
        tags: &'a std::collections::BTreeSet<String>,
    ) -> impl Iterator<Item = &'a Capability> {
        self.capabilities
            .iter()
            .filter(move |c| c.is_agent() && !c.domain_tags.is_disjoint(tags))
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Built-in catalog used when no `capabilities.yaml` has been authored.
pub fn builtin_capabilities() -> Vec<Capability> {
    vec![
        Capability::new(
            "orchestrator",
            "Orchestrator",
            "Generalist coordinator with broad skill coverage; the stable fallback",
            CapabilityKind::Agent,
        )
        .with_domains(&["general"])
        .with_triggers(&["help", "task", "project"])
        .with_planning(true),
        Capability::new(
            "planner",
            "Planner",
            "Produces structured implementation plans",
            CapabilityKind::Agent,
        )
        .with_domains(&["general", "planning"])
        .with_triggers(&["plan", "roadmap", "break down"])
        .with_planning(true),
        Capability::new(
            "frontend-developer",
            "Frontend Developer",
            "Web UI implementation and enhancement",
            CapabilityKind::Agent,
        )
        .with_domains(&["frontend"])
        .with_triggers(&["dark mode", "ui", "css", "frontend", "component", "layout", "theme"]),
        Capability::new(
            "backend-developer",
            "Backend Developer",
            "APIs, services and data plumbing",
            CapabilityKind::Agent,
        )
        .with_domains(&["backend"])
        .with_triggers(&["api", "endpoint", "database", "backend", "server", "migration"]),
        Capability::new(
            "mobile-developer",
            "Mobile Developer",
            "iOS and Android application work",
            CapabilityKind::Agent,
        )
        .with_domains(&["mobile"])
        .with_triggers(&["mobile app", "ios", "android", "mobile"]),
        Capability::new(
            "security-auditor",
            "Security Auditor",
            "Reviews code and designs for vulnerabilities",
            CapabilityKind::Agent,
        )
        .with_domains(&["security"])
        .with_triggers(&["security review", "vulnerability", "audit", "security", "pentest"]),
        Capability::new(
            "code-reviewer",
            "Code Reviewer",
            "Reads diffs and flags defects",
            CapabilityKind::Skill,
        )
        .with_domains(&["quality"])
        .with_triggers(&["code review", "review this", "review my"]),
        Capability::new(
            "test-writer",
            "Test Writer",
            "Generates and repairs test suites",
            CapabilityKind::Skill,
        )
        .with_domains(&["quality"])
        .with_triggers(&["write tests", "test coverage", "unit test"]),
        Capability::new(
            "feature-delivery",
            "Feature Delivery",
            "Plan, implement and verify a feature across the stack",
            CapabilityKind::Workflow {
                min_agents_required: 3,
            },
        )
        .with_domains(&["general", "frontend", "backend"])
        .with_triggers(&["full feature", "end to end", "full stack", "entire app"]),
    ]
}
