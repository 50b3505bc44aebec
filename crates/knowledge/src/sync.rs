use conductor_core::{Error, KnowledgeConfig, KnowledgeItem, Result, Span, TaskStats};
use conductor_storage::{KnowledgeStore, TraceStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Window of recent spans scanned when deriving a promotion streak.
const STREAK_WINDOW: usize = 50;

/// A knowledge read enriched with live trace statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedKnowledge {
    pub item: Option<KnowledgeItem>,
    /// Present when the recent failure rate for the topic crosses the
    /// configured threshold; absent when the trace store is down.
    pub warning: Option<String>,
    pub stats: Option<TaskStats>,
}

/// A staged best-practice promotion awaiting caller confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct BestPracticeProposal {
    pub proposal_id: String,
    pub topic: String,
    pub strategy: String,
}

/// Bridges the trace store and the curated knowledge store.
///
/// Read path: annotates knowledge fetches with a failure-rate warning
/// computed from recent spans. Write path: watches reward emissions and
/// proposes (never silently creates) a best-practice item once a
/// `(task_type, strategy)` pair accumulates enough consecutive
/// high-reward spans. The streak is derived from the persisted trace,
/// so it carries across processes; the synchronizer itself is
/// stateless.
pub struct KnowledgeSynchronizer {
    trace: Arc<dyn TraceStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    cfg: KnowledgeConfig,
}

impl KnowledgeSynchronizer {
    pub fn new(
        trace: Arc<dyn TraceStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        cfg: KnowledgeConfig,
    ) -> Self {
        Self {
            trace,
            knowledge,
            cfg,
        }
    }

    /// Fetch a topic, appending a live failure-rate warning when recent
    /// spans for it are failing. Trace store trouble only drops the
    /// enrichment, never the read.
    pub fn read(&self, topic: &str) -> Result<EnrichedKnowledge> {
        let item = self.knowledge.read(topic)?;

        let stats = match self.trace.stats(topic) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, topic, "Trace store unavailable, skipping enrichment");
                None
            }
        };

        let warning = stats.as_ref().and_then(|s| {
            if s.total > 0 && s.failure_rate > self.cfg.failure_warning_threshold {
                Some(format!(
                    "{:.0}% of the last {} executions for '{}' failed",
                    s.failure_rate * 100.0,
                    s.total,
                    topic
                ))
            } else {
                None
            }
        });

        Ok(EnrichedKnowledge {
            item,
            warning,
            stats,
        })
    }

    /// Feed one rewarded span into the promotion tracker. Returns a
    /// proposal when the trailing run of high-reward spans for the
    /// span's `(task_type, strategy)` pair reaches the configured
    /// streak.
    ///
    /// The run is read back from the trace: spans still awaiting a
    /// reward are skipped, any other rewarded span breaks it. A topic
    /// that is already best practice, or already has a best-practice
    /// proposal pending, is not proposed again; a broken streak never
    /// demotes.
    pub fn observe_reward(&self, span: &Span) -> Result<Option<BestPracticeProposal>> {
        let Some(reward) = span.reward else {
            return Err(Error::Validation(format!(
                "Span {} has no reward to observe",
                span.span_id
            )));
        };

        let strategy = strategy_key(&span.selected_capabilities);
        if reward < self.cfg.promotion_min_reward {
            debug!(task_type = %span.task_type, %strategy, "Reward below promotion bar");
            return Ok(None);
        }

        let streak = self.trailing_streak(&span.task_type, &strategy)?;
        if streak.len() < self.cfg.promotion_streak as usize {
            return Ok(None);
        }

        let already_promoted = self
            .knowledge
            .read(&span.task_type)?
            .map(|item| item.best_practice)
            .unwrap_or(false);
        let already_pending = self
            .knowledge
            .pending_proposals()?
            .iter()
            .any(|p| p.item.topic == span.task_type && p.item.best_practice);
        if already_promoted || already_pending {
            return Ok(None);
        }

        // Link the streak's spans oldest-first.
        let mut linked: Vec<String> = streak
            .into_iter()
            .take(self.cfg.promotion_streak as usize)
            .collect();
        linked.reverse();

        let item = KnowledgeItem {
            topic: span.task_type.clone(),
            content: format!(
                "Strategy '{}' produced {} consecutive high-reward executions for '{}'",
                strategy,
                linked.len(),
                span.task_type
            ),
            linked_spans: linked,
            best_practice: true,
        };
        let proposal_id = self.knowledge.propose_write(item)?;
        info!(
            task_type = %span.task_type,
            %strategy,
            proposal_id = %proposal_id,
            "Best-practice promotion proposed"
        );
        Ok(Some(BestPracticeProposal {
            proposal_id,
            topic: span.task_type.clone(),
            strategy,
        }))
    }

    /// Ids of the newest-first run of rewarded spans matching the
    /// strategy at or above the promotion bar.
    fn trailing_streak(&self, task_type: &str, strategy: &str) -> Result<Vec<String>> {
        let recent = self.trace.recent(task_type, STREAK_WINDOW)?;
        let mut ids = Vec::new();
        for s in &recent {
            let Some(r) = s.reward else { continue };
            if r >= self.cfg.promotion_min_reward
                && strategy_key(&s.selected_capabilities) == strategy
            {
                ids.push(s.span_id.clone());
            } else {
                break;
            }
        }
        Ok(ids)
    }
}

/// Canonical strategy identity: sorted, deduplicated capability ids.
fn strategy_key(capabilities: &[String]) -> String {
    let mut ids: Vec<&str> = capabilities.iter().map(|s| s.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join("+")
}
