use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Tunables for the intent analyzer, adaptive ranker and decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Two domains scoring within this epsilon of each other are
    /// considered tied for ambiguity purposes.
    #[serde(default = "default_ambiguity_epsilon")]
    pub ambiguity_epsilon: f64,
    /// Only spans with reward >= this feed the ranker.
    #[serde(default = "default_min_reward_threshold")]
    pub min_reward_threshold: f64,
    /// Half-life of the exponential recency decay, in days.
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f64,
    /// Max spans fetched per ranking query.
    #[serde(default = "default_ranker_span_limit")]
    pub ranker_span_limit: usize,
    /// Generalist capability used when nothing matches or ambiguity
    /// survives the clarifying round.
    #[serde(default = "default_fallback_capability")]
    pub fallback_capability: String,
    /// Candidates scoring at least this fraction of the top score join
    /// the decision alongside it.
    #[serde(default = "default_selection_band")]
    pub selection_band: f64,
}

fn default_ambiguity_epsilon() -> f64 {
    0.15
}

fn default_min_reward_threshold() -> f64 {
    0.8
}

fn default_recency_half_life_days() -> f64 {
    14.0
}

fn default_ranker_span_limit() -> usize {
    50
}

fn default_fallback_capability() -> String {
    "orchestrator".to_string()
}

fn default_selection_band() -> f64 {
    0.75
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ambiguity_epsilon: default_ambiguity_epsilon(),
            min_reward_threshold: default_min_reward_threshold(),
            recency_half_life_days: default_recency_half_life_days(),
            ranker_span_limit: default_ranker_span_limit(),
            fallback_capability: default_fallback_capability(),
            selection_band: default_selection_band(),
        }
    }
}

/// Tunables for the workflow state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Verification failures tolerated before the run is rejected.
    #[serde(default = "default_verification_retry_cap")]
    pub verification_retry_cap: u32,
    /// Distinct agents an orchestration-mode run must invoke before it
    /// may complete.
    #[serde(default = "default_min_orchestration_agents")]
    pub min_orchestration_agents: usize,
    /// Per-invocation timeout in milliseconds; None blocks indefinitely.
    #[serde(default)]
    pub invocation_timeout_ms: Option<u64>,
    /// Archived runs older than this many days are pruned.
    #[serde(default = "default_run_retention_days")]
    pub run_retention_days: i64,
}

fn default_verification_retry_cap() -> u32 {
    2
}

fn default_min_orchestration_agents() -> usize {
    3
}

fn default_run_retention_days() -> i64 {
    30
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            verification_retry_cap: default_verification_retry_cap(),
            min_orchestration_agents: default_min_orchestration_agents(),
            invocation_timeout_ms: None,
            run_retention_days: default_run_retention_days(),
        }
    }
}

/// Tunables for the knowledge synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeConfig {
    /// Failure rate above which knowledge reads carry a live warning.
    #[serde(default = "default_failure_warning_threshold")]
    pub failure_warning_threshold: f64,
    /// Consecutive high-reward spans required before a best-practice
    /// proposal is raised.
    #[serde(default = "default_promotion_streak")]
    pub promotion_streak: u32,
    /// Reward at or above which a span counts toward the streak.
    #[serde(default = "default_promotion_min_reward")]
    pub promotion_min_reward: f64,
}

fn default_failure_warning_threshold() -> f64 {
    0.5
}

fn default_promotion_streak() -> u32 {
    3
}

fn default_promotion_min_reward() -> f64 {
    0.9
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            failure_warning_threshold: default_failure_warning_threshold(),
            promotion_streak: default_promotion_streak(),
            promotion_min_reward: default_promotion_min_reward(),
        }
    }
}

/// Top-level configuration, persisted as JSON under the base directory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

impl Config {
    /// Load from the given path, falling back to defaults when the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.router.min_reward_threshold, 0.8);
        assert_eq!(cfg.router.fallback_capability, "orchestrator");
        assert_eq!(cfg.workflow.verification_retry_cap, 2);
        assert_eq!(cfg.workflow.min_orchestration_agents, 3);
        assert_eq!(cfg.knowledge.failure_warning_threshold, 0.5);
        assert_eq!(cfg.knowledge.promotion_streak, 3);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(cfg.workflow.min_orchestration_agents, 3);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = Config::default();
        cfg.workflow.verification_retry_cap = 5;
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.workflow.verification_retry_cap, 5);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"router":{"ambiguityEpsilon":0.3}}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.router.ambiguity_epsilon, 0.3);
        assert_eq!(cfg.router.min_reward_threshold, 0.8);
    }
}
