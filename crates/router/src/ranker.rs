use chrono::Utc;
use conductor_core::RouterConfig;
use conductor_storage::TraceStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-candidate multiplicative bias derived from trace history.
#[derive(Debug, Clone)]
pub struct RankerBias {
    /// capability id -> bias in [1.0, 2.0]; 1.0 is neutral.
    pub biases: BTreeMap<String, f64>,
    /// False when the trace store was unreachable and neutral biases
    /// were substituted.
    pub available: bool,
}

impl RankerBias {
    pub fn neutral(candidates: &[String]) -> Self {
        Self {
            biases: candidates.iter().map(|c| (c.clone(), 1.0)).collect(),
            available: false,
        }
    }

    pub fn bias_for(&self, capability_id: &str) -> f64 {
        self.biases.get(capability_id).copied().unwrap_or(1.0)
    }
}

/// Weights candidate capabilities by recency-decayed historical reward.
///
/// Only spans at or above the configured reward threshold contribute;
/// a span's weight halves every `recency_half_life_days`. Decay is
/// anchored to the newest rewarded span, so an unchanged store snapshot
/// always yields the same biases. A store error degrades to neutral
/// biases rather than failing the request.
pub struct AdaptiveRanker {
    trace: Arc<dyn TraceStore>,
    cfg: RouterConfig,
}

impl AdaptiveRanker {
    pub fn new(trace: Arc<dyn TraceStore>, cfg: RouterConfig) -> Self {
        Self { trace, cfg }
    }

    pub fn rank(&self, task_type: &str, candidates: &[String]) -> RankerBias {
        let spans = match self.trace.query(
            task_type,
            self.cfg.min_reward_threshold,
            self.cfg.ranker_span_limit,
        ) {
            Ok(spans) => spans,
            Err(e) => {
                warn!(error = %e, task_type, "Trace store unavailable, ranking unweighted");
                return RankerBias::neutral(candidates);
            }
        };

        let anchor = spans
            .iter()
            .map(|s| s.timestamp)
            .max()
            .unwrap_or_else(Utc::now);
        let half_life_secs = self.cfg.recency_half_life_days * 86_400.0;
        let mut biases = BTreeMap::new();

        for candidate in candidates {
            let mut weight_sum = 0.0;
            let mut reward_sum = 0.0;
            for span in &spans {
                if !span.selected_capabilities.iter().any(|c| c == candidate) {
                    continue;
                }
                let Some(reward) = span.reward else { continue };
                let age_secs = (anchor - span.timestamp).num_seconds().max(0) as f64;
                let weight = 0.5_f64.powf(age_secs / half_life_secs);
                weight_sum += weight;
                reward_sum += weight * reward;
            }
            let bias = if weight_sum > 0.0 {
                1.0 + reward_sum / weight_sum
            } else {
                1.0
            };
            biases.insert(candidate.clone(), bias);
        }

        debug!(task_type, spans = spans.len(), "Ranker biases computed");
        RankerBias {
            biases,
            available: true,
        }
    }
}
