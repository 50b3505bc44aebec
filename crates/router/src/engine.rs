use conductor_core::{CapabilityKind, Error, Goal, Result, RouterConfig, RoutingDecision};
use conductor_registry::CapabilityRegistry;
use conductor_storage::TraceStore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::intent::{IntentAnalyzer, IntentSignal};
use crate::ranker::AdaptiveRanker;

/// Caller-supplied context for one routing request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Stable request id; derived from the request text when absent so
    /// identical requests produce identical decisions.
    pub request_id: Option<String>,
    /// Task type used for trace queries; derived from goal and top
    /// domain family when absent.
    pub task_type: Option<String>,
    /// Where the work applies (repo, service, module); free-form.
    pub scope: Option<String>,
    /// Explicit capability marker from the calling surface.
    pub explicit_capability: Option<String>,
    /// 0 on first contact; 1 after the caller answered the single
    /// clarifying question.
    pub clarification_round: u8,
}

/// Outcome of `route`: either a final decision or one clarifying
/// question. Never more than one round before falling back.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Decision(RoutingDecision),
    NeedsClarification {
        request_id: String,
        question: String,
        candidates: Vec<String>,
    },
}

impl RouteOutcome {
    pub fn decision(&self) -> Option<&RoutingDecision> {
        match self {
            RouteOutcome::Decision(d) => Some(d),
            RouteOutcome::NeedsClarification { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ScoredCandidate {
    capability_id: String,
    family: String,
    raw: f64,
    adjusted: f64,
}

struct Selection {
    ranked: Vec<ScoredCandidate>,
    weighted: bool,
}

/// Combines intent analysis with ranker bias into a routing decision.
///
/// Tie-break order: explicit override, then highest bias-adjusted score
/// with stable id ordering, then the generalist fallback. Given an
/// unchanged registry and trace snapshot, identical inputs produce
/// bit-identical decisions.
pub struct DecisionEngine {
    registry: Arc<CapabilityRegistry>,
    analyzer: IntentAnalyzer,
    ranker: AdaptiveRanker,
    cfg: RouterConfig,
}

impl DecisionEngine {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        trace: Arc<dyn TraceStore>,
        cfg: RouterConfig,
    ) -> Self {
        let analyzer = IntentAnalyzer::new(registry.clone());
        let ranker = AdaptiveRanker::new(trace, cfg.clone());
        Self {
            registry,
            analyzer,
            ranker,
            cfg,
        }
    }

    pub fn route(&self, request: &str, ctx: &RequestContext) -> Result<RouteOutcome> {
        let signal = self
            .analyzer
            .analyze(request, ctx.explicit_capability.as_deref());
        let request_id = ctx
            .request_id
            .clone()
            .unwrap_or_else(|| derive_request_id(request));

        if let Some(id) = &signal.explicit_override {
            return Ok(RouteOutcome::Decision(self.override_decision(
                &request_id,
                id,
                &signal,
                ctx,
            )?));
        }

        let task_type = ctx.task_type.clone().unwrap_or_else(|| {
            let family = signal
                .candidates
                .first()
                .map(|c| c.family.as_str())
                .unwrap_or("general");
            derive_task_type(signal.goal, family)
        });

        match self.select(&signal, &task_type) {
            Ok(selection) => {
                let decision = self.build_decision(&request_id, &signal, ctx, selection);
                debug!(request_id = %decision.request_id, who = ?decision.who, "Routing decision");
                Ok(RouteOutcome::Decision(decision))
            }
            Err(Error::AmbiguousIntent { candidates }) => {
                if ctx.clarification_round == 0 {
                    info!(?candidates, "Ambiguous intent, asking one clarifying question");
                    Ok(RouteOutcome::NeedsClarification {
                        request_id,
                        question: format!(
                            "This request could go to {}. Which should take it?",
                            candidates.join(" or ")
                        ),
                        candidates,
                    })
                } else {
                    warn!("Still ambiguous after clarification, using generalist fallback");
                    Ok(RouteOutcome::Decision(self.fallback_decision(
                        &request_id,
                        &signal,
                        ctx,
                        &task_type,
                        "ambiguity unresolved after one clarifying round",
                    )))
                }
            }
            Err(Error::NoMatchingCapability(_)) => {
                debug!("No trigger matched, using generalist fallback");
                Ok(RouteOutcome::Decision(self.fallback_decision(
                    &request_id,
                    &signal,
                    ctx,
                    &task_type,
                    "no capability trigger matched",
                )))
            }
            Err(e) => Err(e),
        }
    }

    fn select(&self, signal: &IntentSignal, task_type: &str) -> Result<Selection> {
        if signal.candidates.is_empty() {
            return Err(Error::NoMatchingCapability(task_type.to_string()));
        }

        let candidate_ids: Vec<String> = signal
            .candidates
            .iter()
            .map(|c| c.capability_id.clone())
            .collect();
        let bias = self.ranker.rank(task_type, &candidate_ids);

        let mut ranked: Vec<ScoredCandidate> = signal
            .candidates
            .iter()
            .map(|c| ScoredCandidate {
                capability_id: c.capability_id.clone(),
                family: c.family.clone(),
                raw: c.score,
                adjusted: c.score * bias.bias_for(&c.capability_id),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.adjusted
                .total_cmp(&a.adjusted)
                .then_with(|| a.capability_id.cmp(&b.capability_id))
        });

        // Cross-family tie that bias did not break needs one clarifying
        // round-trip rather than a silent merge.
        if let (Some(top), Some(second)) = (ranked.first(), ranked.get(1)) {
            if top.family != second.family
                && (top.adjusted - second.adjusted).abs() <= self.cfg.ambiguity_epsilon
            {
                return Err(Error::AmbiguousIntent {
                    candidates: vec![top.capability_id.clone(), second.capability_id.clone()],
                });
            }
        }

        Ok(Selection {
            ranked,
            weighted: bias.available,
        })
    }

    fn build_decision(
        &self,
        request_id: &str,
        signal: &IntentSignal,
        ctx: &RequestContext,
        selection: Selection,
    ) -> RoutingDecision {
        let top = &selection.ranked[0];
        let band = top.adjusted * self.cfg.selection_band;

        let mut who: Vec<String> = Vec::new();
        let mut how: Vec<String> = Vec::new();
        let mut rationale = format!(
            "top match '{}' (family {}, score {:.2}, adjusted {:.2})",
            top.capability_id, top.family, top.raw, top.adjusted
        );

        let top_cap = self.registry.get(&top.capability_id);
        if let Some(cap) = top_cap.filter(|c| c.is_workflow()) {
            // A workflow win expands into its domain agents and puts the
            // run in orchestration mode.
            if let CapabilityKind::Workflow {
                min_agents_required,
            } = cap.kind
            {
                who = self
                    .registry
                    .agents_in_domains(&cap.domain_tags)
                    .map(|a| a.id.clone())
                    .take(min_agents_required.max(3))
                    .collect();
                rationale.push_str(&format!(
                    "; workflow '{}' requires {} agents",
                    cap.id, min_agents_required
                ));
            }
        } else {
            for c in &selection.ranked {
                if c.adjusted < band {
                    break;
                }
                match self.registry.get(&c.capability_id).map(|cap| &cap.kind) {
                    Some(CapabilityKind::Agent) => who.push(c.capability_id.clone()),
                    Some(CapabilityKind::Skill) => how.push(c.capability_id.clone()),
                    _ => {}
                }
            }
        }

        let confidence = match selection.ranked.get(1) {
            Some(second) if top.adjusted > 0.0 => {
                (top.adjusted / (top.adjusted + second.adjusted)).clamp(0.0, 1.0)
            }
            _ => 1.0,
        };
        if !selection.weighted {
            rationale.push_str("; trace store unavailable, scores unweighted");
        }

        RoutingDecision {
            request_id: request_id.to_string(),
            when_priority: signal.priority,
            where_scope: ctx.scope.clone().unwrap_or_else(|| "project".to_string()),
            what_goal: signal.goal,
            who,
            how,
            why_rationale: rationale,
            weighted: selection.weighted,
            confidence,
        }
    }

    fn override_decision(
        &self,
        request_id: &str,
        capability_id: &str,
        signal: &IntentSignal,
        ctx: &RequestContext,
    ) -> Result<RoutingDecision> {
        let cap = self
            .registry
            .get(capability_id)
            .ok_or_else(|| Error::NoMatchingCapability(capability_id.to_string()))?;

        let (who, how) = match cap.kind {
            CapabilityKind::Skill => (Vec::new(), vec![cap.id.clone()]),
            _ => (vec![cap.id.clone()], Vec::new()),
        };

        Ok(RoutingDecision {
            request_id: request_id.to_string(),
            when_priority: signal.priority,
            where_scope: ctx.scope.clone().unwrap_or_else(|| "project".to_string()),
            what_goal: signal.goal,
            who,
            how,
            why_rationale: format!("explicit mention of '{}', scoring bypassed", cap.id),
            weighted: false,
            confidence: 1.0,
        })
    }

    fn fallback_decision(
        &self,
        request_id: &str,
        signal: &IntentSignal,
        ctx: &RequestContext,
        task_type: &str,
        reason: &str,
    ) -> RoutingDecision {
        let fallback = self.registry.fallback();
        // Consult the ranker so the weighted flag still reflects store health.
        let bias = self.ranker.rank(task_type, std::slice::from_ref(&fallback.id));
        RoutingDecision {
            request_id: request_id.to_string(),
            when_priority: signal.priority,
            where_scope: ctx.scope.clone().unwrap_or_else(|| "project".to_string()),
            what_goal: signal.goal,
            who: vec![fallback.id.clone()],
            how: Vec::new(),
            why_rationale: format!("{}; falling back to generalist '{}'", reason, fallback.id),
            weighted: bias.available,
            confidence: 0.25,
        }
    }
}

/// Stable request id derived from the request text.
pub fn derive_request_id(request: &str) -> String {
    let digest = Sha256::digest(request.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("req-{}", &hex[..16])
}

/// Task type used for trace queries when the caller supplies none.
pub fn derive_task_type(goal: Goal, family: &str) -> String {
    format!("{}_{}", family, goal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{NewSpan, Outcome};
    use conductor_registry::builtin_capabilities;
    use conductor_storage::{SqliteTraceStore, TraceStore};
    use tempfile::TempDir;

    fn registry() -> Arc<CapabilityRegistry> {
        Arc::new(
            CapabilityRegistry::from_capabilities(builtin_capabilities(), "orchestrator").unwrap(),
        )
    }

    fn engine_with_store(store: Arc<dyn TraceStore>) -> DecisionEngine {
        DecisionEngine::new(registry(), store, RouterConfig::default())
    }

    fn sqlite_engine(dir: &TempDir) -> (DecisionEngine, Arc<SqliteTraceStore>) {
        let store = Arc::new(SqliteTraceStore::open(&dir.path().join("t.db")).unwrap());
        (engine_with_store(store.clone()), store)
    }

    #[test]
    fn test_dark_mode_routes_to_frontend() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = sqlite_engine(&dir);
        let outcome = engine
            .route("Add dark mode to existing app", &RequestContext::default())
            .unwrap();
        let d = outcome.decision().unwrap().clone();
        assert_eq!(d.what_goal, Goal::Enhance);
        assert_eq!(d.who, vec!["frontend-developer"]);
        assert!(!d.is_orchestration());
        assert!(d.weighted);
    }

    #[test]
    fn test_explicit_mention_wins_regardless_of_scores() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = sqlite_engine(&dir);
        let outcome = engine
            .route(
                "@security-auditor review this frontend css api endpoint",
                &RequestContext::default(),
            )
            .unwrap();
        let d = outcome.decision().unwrap();
        assert_eq!(d.who, vec!["security-auditor"]);
        assert!(d.how.is_empty());
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_skill_mention_lands_in_how() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = sqlite_engine(&dir);
        let outcome = engine
            .route("@test-writer cover the parser", &RequestContext::default())
            .unwrap();
        let d = outcome.decision().unwrap();
        assert!(d.who.is_empty());
        assert_eq!(d.how, vec!["test-writer"]);
    }

    #[test]
    fn test_route_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let (engine, store) = sqlite_engine(&dir);
        let id = store
            .append(
                NewSpan::new("frontend_enhance", "q", Outcome::Success)
                    .with_capabilities(&["frontend-developer"]),
            )
            .unwrap();
        store.set_reward(&id, 1.0, serde_json::Value::Null).unwrap();

        let ctx = RequestContext::default();
        let d1 = engine
            .route("Add dark mode to existing app", &ctx)
            .unwrap()
            .decision()
            .unwrap()
            .clone();
        let d2 = engine
            .route("Add dark mode to existing app", &ctx)
            .unwrap()
            .decision()
            .unwrap()
            .clone();
        assert_eq!(d1, d2);
        assert!(d1.request_id.starts_with("req-"));
    }

    #[test]
    fn test_ambiguity_asks_once_then_falls_back() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = sqlite_engine(&dir);

        let first = engine
            .route("mobile security", &RequestContext::default())
            .unwrap();
        match first {
            RouteOutcome::NeedsClarification {
                question,
                candidates,
                ..
            } => {
                assert!(question.contains("?"));
                assert_eq!(candidates.len(), 2);
            }
            RouteOutcome::Decision(d) => panic!("expected clarification, got {:?}", d.who),
        }

        // same text after one round falls back to the generalist
        let second = engine
            .route(
                "mobile security",
                &RequestContext {
                    clarification_round: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        let d = second.decision().unwrap();
        assert_eq!(d.who, vec!["orchestrator"]);
    }

    #[test]
    fn test_no_match_falls_back_to_generalist() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = sqlite_engine(&dir);
        let outcome = engine
            .route("zzz qqq xyzzy", &RequestContext::default())
            .unwrap();
        let d = outcome.decision().unwrap();
        assert_eq!(d.who, vec!["orchestrator"]);
        assert!(d.why_rationale.contains("falling back"));
    }

    #[test]
    fn test_historical_reward_breaks_same_family_tie() {
        // two backend-ish agents both triggered by "api"; history should
        // push the better performer on top
        let caps = vec![
            conductor_core::Capability::new("orchestrator", "O", "", CapabilityKind::Agent)
                .with_domains(&["general"])
                .with_planning(true),
            conductor_core::Capability::new("agent-a", "A", "", CapabilityKind::Agent)
                .with_domains(&["backend"])
                .with_triggers(&["api"]),
            conductor_core::Capability::new("agent-b", "B", "", CapabilityKind::Agent)
                .with_domains(&["backend"])
                .with_triggers(&["api"]),
        ];
        let registry =
            Arc::new(CapabilityRegistry::from_capabilities(caps, "orchestrator").unwrap());
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteTraceStore::open(&dir.path().join("t.db")).unwrap());

        for (cap, reward) in [("agent-a", 0.98), ("agent-b", 0.85)] {
            let id = store
                .append(
                    NewSpan::new("api_implementation", "q", Outcome::Success)
                        .with_capabilities(&[cap]),
                )
                .unwrap();
            store.set_reward(&id, reward, serde_json::Value::Null).unwrap();
        }

        let engine = DecisionEngine::new(registry, store, RouterConfig::default());
        let ctx = RequestContext {
            task_type: Some("api_implementation".to_string()),
            ..Default::default()
        };
        let d = engine
            .route("implement the api", &ctx)
            .unwrap()
            .decision()
            .unwrap()
            .clone();
        assert_eq!(d.who[0], "agent-a");
        assert!(d.weighted);
    }

    #[test]
    fn test_unreachable_store_still_routes_unweighted() {
        struct Down;
        impl TraceStore for Down {
            fn append(&self, _: NewSpan) -> conductor_core::Result<String> {
                Err(Error::StoreUnavailable("trace".into()))
            }
            fn get(&self, _: &str) -> conductor_core::Result<Option<conductor_core::Span>> {
                Err(Error::StoreUnavailable("trace".into()))
            }
            fn set_reward(
                &self,
                _: &str,
                _: f64,
                _: serde_json::Value,
            ) -> conductor_core::Result<()> {
                Err(Error::StoreUnavailable("trace".into()))
            }
            fn query(
                &self,
                _: &str,
                _: f64,
                _: usize,
            ) -> conductor_core::Result<Vec<conductor_core::Span>> {
                Err(Error::StoreUnavailable("trace".into()))
            }
            fn recent(
                &self,
                _: &str,
                _: usize,
            ) -> conductor_core::Result<Vec<conductor_core::Span>> {
                Err(Error::StoreUnavailable("trace".into()))
            }
            fn stats(&self, _: &str) -> conductor_core::Result<conductor_core::TaskStats> {
                Err(Error::StoreUnavailable("trace".into()))
            }
        }

        let engine = engine_with_store(Arc::new(Down));
        let outcome = engine
            .route("Add dark mode to existing app", &RequestContext::default())
            .unwrap();
        let d = outcome.decision().unwrap();
        assert_eq!(d.who, vec!["frontend-developer"]);
        assert!(!d.weighted);
        assert!(d.why_rationale.contains("unweighted"));
    }

    #[test]
    fn test_workflow_win_enters_orchestration_mode() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = sqlite_engine(&dir);
        let outcome = engine
            .route(
                "build the full feature end to end across the entire app",
                &RequestContext::default(),
            )
            .unwrap();
        let d = outcome.decision().unwrap();
        assert!(d.who.len() >= 3, "workflow should expand to agents: {:?}", d.who);
        assert!(d.is_orchestration());
    }

    #[test]
    fn test_derive_request_id_stable() {
        assert_eq!(derive_request_id("abc"), derive_request_id("abc"));
        assert_ne!(derive_request_id("abc"), derive_request_id("abd"));
    }
}
