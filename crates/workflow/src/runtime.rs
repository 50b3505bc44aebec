use conductor_core::{Config, Result, RoutingDecision, Span};
use conductor_knowledge::{BestPracticeProposal, EnrichedKnowledge, KnowledgeSynchronizer};
use conductor_registry::CapabilityRegistry;
use conductor_router::{derive_task_type, DecisionEngine, RequestContext, RouteOutcome};
use conductor_storage::{KnowledgeStore, TraceStore};
use std::sync::Arc;
use tracing::info;

use crate::invoker::{CapabilityInvoker, Verifier};
use crate::machine::{Approval, WorkflowMachine, WorkflowRun};

/// Top-level facade wiring the router, the state machine and the
/// knowledge synchronizer around shared stores.
pub struct Conductor {
    registry: Arc<CapabilityRegistry>,
    engine: DecisionEngine,
    machine: WorkflowMachine,
    trace: Arc<dyn TraceStore>,
    sync: KnowledgeSynchronizer,
}

impl Conductor {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        trace: Arc<dyn TraceStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        invoker: Arc<dyn CapabilityInvoker>,
        verifier: Arc<dyn Verifier>,
        config: Config,
    ) -> Self {
        let engine = DecisionEngine::new(registry.clone(), trace.clone(), config.router.clone());
        let machine = WorkflowMachine::new(
            registry.clone(),
            trace.clone(),
            invoker,
            verifier,
            config.workflow.clone(),
        );
        let sync = KnowledgeSynchronizer::new(trace.clone(), knowledge, config.knowledge.clone());
        Self {
            registry,
            engine,
            machine,
            trace,
            sync,
        }
    }

    pub fn machine(&self) -> &WorkflowMachine {
        &self.machine
    }

    /// Route a request without starting a run.
    pub fn route(&self, request: &str, ctx: &RequestContext) -> Result<RouteOutcome> {
        self.engine.route(request, ctx)
    }

    /// Route a request and, when routing settles on a decision, start a
    /// run for it. Clarification questions pass through untouched.
    pub async fn start(&self, request: &str, ctx: &RequestContext) -> Result<RouteOutcome> {
        let outcome = self.engine.route(request, ctx)?;
        if let RouteOutcome::Decision(decision) = &outcome {
            let task_type = self.task_type_for(decision, ctx);
            self.machine
                .start(decision.clone(), &task_type, request)
                .await?;
        }
        Ok(outcome)
    }

    pub async fn start_from_decision(
        &self,
        decision: RoutingDecision,
        task_type: &str,
        query: &str,
    ) -> Result<WorkflowRun> {
        self.machine.start(decision, task_type, query).await
    }

    pub async fn advance(&self, request_id: &str, approval: Approval) -> Result<WorkflowRun> {
        self.machine.advance(request_id, approval).await
    }

    /// Current state of a run: phase, plan, invoked agents, span ids.
    pub async fn plan_state(&self, request_id: &str) -> Result<WorkflowRun> {
        self.machine.get(request_id).await
    }

    /// Attach a reward to a span, exactly once, and feed it into the
    /// best-practice promotion tracker.
    pub fn emit_reward(
        &self,
        span_id: &str,
        value: f64,
        metadata: serde_json::Value,
    ) -> Result<Option<BestPracticeProposal>> {
        self.trace.set_reward(span_id, value, metadata)?;
        let span: Span = self
            .trace
            .get(span_id)?
            .ok_or_else(|| conductor_core::Error::NotFound(format!("Span {} not found", span_id)))?;
        info!(span_id, value, "Reward emitted");
        self.sync.observe_reward(&span)
    }

    pub fn read_knowledge(&self, topic: &str) -> Result<EnrichedKnowledge> {
        self.sync.read(topic)
    }

    /// Trace grouping key for a decision: the caller's override or
    /// `{family}_{goal}` of the primary agent.
    pub fn task_type_for(&self, decision: &RoutingDecision, ctx: &RequestContext) -> String {
        if let Some(t) = &ctx.task_type {
            return t.clone();
        }
        let family = decision
            .primary_agent()
            .and_then(|id| self.registry.get(id))
            .map(|c| c.family().to_string())
            .unwrap_or_else(|| "general".to_string());
        derive_task_type(decision.what_goal, &family)
    }
}
