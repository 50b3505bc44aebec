use chrono::{DateTime, Duration, Utc};
use conductor_core::{Error, NewSpan, Outcome, Result, RoutingDecision, WorkflowConfig};
use conductor_registry::CapabilityRegistry;
use conductor_storage::TraceStore;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::invoker::{CapabilityInvoker, InvocationRequest, Verifier};
use crate::plan::{PlanArtifact, PlanStep};

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    AwaitingApproval,
    Implementation,
    Verification,
    Complete,
    Rejected,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::AwaitingApproval => "awaiting_approval",
            Phase::Implementation => "implementation",
            Phase::Verification => "verification",
            Phase::Complete => "complete",
            Phase::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller response at the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Accept,
    Reject,
    Abort,
}

impl Approval {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accept" => Some(Approval::Accept),
            "reject" => Some(Approval::Reject),
            "abort" => Some(Approval::Abort),
            _ => None,
        }
    }
}

/// Mutable state of one routed request as it moves through the
/// lifecycle. Archived (not deleted) on completion or rejection.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub request_id: String,
    pub decision: RoutingDecision,
    pub task_type: String,
    pub query: String,
    pub phase: Phase,
    /// Distinct agents invoked so far; gates orchestration completion.
    pub invoked_agents: BTreeSet<String>,
    pub plan: Option<PlanArtifact>,
    pub verification_attempts: u32,
    pub findings: Vec<String>,
    pub last_error: Option<String>,
    pub span_ids: Vec<String>,
    /// Latest artifact per capability id.
    pub artifacts: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

enum InvokeResult {
    Done(Result<crate::invoker::InvocationOutput>),
    TimedOut,
}

/// Drives runs through planning, approval, implementation and
/// verification.
///
/// Phase writes go through the shared run table so `abort` can land
/// while an `advance` is mid-flight; in-flight invocations that finish
/// after an abort are recorded as superseded.
pub struct WorkflowMachine {
    registry: Arc<CapabilityRegistry>,
    trace: Arc<dyn TraceStore>,
    invoker: Arc<dyn CapabilityInvoker>,
    verifier: Arc<dyn Verifier>,
    cfg: WorkflowConfig,
    runs: Arc<Mutex<HashMap<String, WorkflowRun>>>,
    abort_flags: Arc<StdMutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl WorkflowMachine {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        trace: Arc<dyn TraceStore>,
        invoker: Arc<dyn CapabilityInvoker>,
        verifier: Arc<dyn Verifier>,
        cfg: WorkflowConfig,
    ) -> Self {
        Self {
            registry,
            trace,
            invoker,
            verifier,
            cfg,
            runs: Arc::new(Mutex::new(HashMap::new())),
            abort_flags: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Create a run from a decision, execute the planning phase and park
    /// it at the approval gate. Archived runs past the retention window
    /// are pruned on the way in.
    pub async fn start(
        &self,
        decision: RoutingDecision,
        task_type: &str,
        query: &str,
    ) -> Result<WorkflowRun> {
        self.cleanup_old_runs().await;
        let request_id = decision.request_id.clone();
        {
            let runs = self.runs.lock().await;
            if runs.contains_key(&request_id) {
                return Err(Error::Validation(format!(
                    "Run {} already exists",
                    request_id
                )));
            }
        }
        self.abort_flag(&request_id);

        let now = Utc::now();
        let mut run = WorkflowRun {
            request_id: request_id.clone(),
            decision,
            task_type: task_type.to_string(),
            query: query.to_string(),
            phase: Phase::Planning,
            invoked_agents: BTreeSet::new(),
            plan: None,
            verification_attempts: 0,
            findings: Vec::new(),
            last_error: None,
            span_ids: Vec::new(),
            artifacts: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };

        let plan = self.build_plan(&run).await;
        run.plan = Some(plan);
        run.phase = Phase::AwaitingApproval;
        run.updated_at = Utc::now();
        info!(request_id = %request_id, "Run awaiting approval");

        let mut runs = self.runs.lock().await;
        runs.insert(request_id, run.clone());
        Ok(run)
    }

    /// Resolve the approval gate. Accept runs implementation and
    /// verification to completion; Reject discards the plan and
    /// re-plans; Abort archives the run as rejected.
    pub async fn advance(&self, request_id: &str, approval: Approval) -> Result<WorkflowRun> {
        let run = self.get(request_id).await?;
        if run.phase != Phase::AwaitingApproval {
            return Err(Error::InvalidTransition {
                from: run.phase.as_str().to_string(),
                to: Phase::Implementation.as_str().to_string(),
            });
        }

        match approval {
            Approval::Abort => self.abort(request_id).await,
            Approval::Reject => {
                info!(request_id, "Plan rejected, re-planning");
                let plan = self.build_plan(&run).await;
                self.with_run(request_id, |r| {
                    r.plan = Some(plan);
                    r.updated_at = Utc::now();
                })
                .await?;
                self.get(request_id).await
            }
            Approval::Accept => {
                self.with_run(request_id, |r| {
                    r.phase = Phase::Implementation;
                    r.last_error = None;
                    r.updated_at = Utc::now();
                })
                .await?;
                let plan = run
                    .plan
                    .ok_or_else(|| Error::Validation(format!("Run {} has no plan", request_id)))?;
                for batch in plan.batches() {
                    self.run_batch(&run.task_type, &run.query, request_id, &batch)
                        .await?;
                    if self.is_aborted(request_id) {
                        return self.get(request_id).await;
                    }
                }
                self.verify_and_complete(request_id).await
            }
        }
    }

    /// Pull one more capability into a run stuck below the orchestration
    /// minimum.
    pub async fn invoke_additional(
        &self,
        request_id: &str,
        capability_id: &str,
    ) -> Result<WorkflowRun> {
        let run = self.get(request_id).await?;
        if run.phase != Phase::Implementation {
            return Err(Error::InvalidTransition {
                from: run.phase.as_str().to_string(),
                to: Phase::Implementation.as_str().to_string(),
            });
        }
        if self.registry.get(capability_id).is_none() {
            return Err(Error::NotFound(format!(
                "Capability '{}' not in catalog",
                capability_id
            )));
        }
        let step = PlanStep {
            index: 0,
            capability_id: capability_id.to_string(),
            description: format!("{}: {}", capability_id, run.query),
            depends_on: Vec::new(),
        };
        self.run_batch(&run.task_type, &run.query, request_id, &[&step])
            .await?;
        self.get(request_id).await
    }

    /// Re-run verification for a run parked in Implementation after a
    /// completion gate failure.
    pub async fn resume(&self, request_id: &str) -> Result<WorkflowRun> {
        let run = self.get(request_id).await?;
        if run.phase != Phase::Implementation {
            return Err(Error::InvalidTransition {
                from: run.phase.as_str().to_string(),
                to: Phase::Verification.as_str().to_string(),
            });
        }
        self.verify_and_complete(request_id).await
    }

    /// Abort a run from any live phase. Invocations already in flight
    /// finish and are recorded as superseded.
    pub async fn abort(&self, request_id: &str) -> Result<WorkflowRun> {
        let run = self.get(request_id).await?;
        if matches!(run.phase, Phase::Complete) {
            return Err(Error::InvalidTransition {
                from: run.phase.as_str().to_string(),
                to: Phase::Rejected.as_str().to_string(),
            });
        }
        self.abort_flag(request_id).store(true, Ordering::SeqCst);
        self.with_run(request_id, |r| {
            r.phase = Phase::Rejected;
            r.last_error = Some("aborted by caller".to_string());
            r.archived_at = Some(Utc::now());
            r.updated_at = Utc::now();
        })
        .await?;
        info!(request_id, "Run aborted");
        self.get(request_id).await
    }

    pub async fn get(&self, request_id: &str) -> Result<WorkflowRun> {
        let runs = self.runs.lock().await;
        runs.get(request_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Run {} not found", request_id)))
    }

    /// Drop archived runs older than the retention window. Returns the
    /// number removed.
    pub async fn cleanup_old_runs(&self) -> usize {
        let cutoff = Utc::now() - Duration::days(self.cfg.run_retention_days);
        let mut runs = self.runs.lock().await;
        let before = runs.len();
        runs.retain(|_, r| match r.archived_at {
            Some(archived) => archived > cutoff,
            None => true,
        });
        let removed = before - runs.len();
        if removed > 0 {
            let mut flags = self.abort_flags.lock().unwrap_or_else(|e| e.into_inner());
            flags.retain(|id, _| runs.contains_key(id));
            debug!(removed, "Pruned archived runs");
        }
        removed
    }

    async fn build_plan(&self, run: &WorkflowRun) -> PlanArtifact {
        let mut notes = Vec::new();
        for id in &run.decision.who {
            let Some(cap) = self.registry.get(id).filter(|c| c.planning_capable) else {
                continue;
            };
            let request = InvocationRequest {
                request_id: run.request_id.clone(),
                capability_id: cap.id.clone(),
                instruction: format!("Draft an implementation plan for: {}", run.query),
                context: serde_json::json!({ "phase": "planning" }),
            };
            match self.invoker.invoke(&request).await {
                Ok(output) => notes.push(output.summary),
                Err(e) => {
                    warn!(capability = %cap.id, error = %e, "Planning invocation failed")
                }
            }
        }
        let mut plan = PlanArtifact::from_decision(&run.decision, &run.query);
        plan.notes.extend(notes);
        plan
    }

    /// Invoke one dependency layer concurrently. Spans are appended in
    /// completion order; a timeout or abort on one invocation never
    /// disturbs its siblings.
    async fn run_batch(
        &self,
        task_type: &str,
        query: &str,
        request_id: &str,
        batch: &[&PlanStep],
    ) -> Result<()> {
        let flag = self.abort_flag(request_id);
        let mut tasks = FuturesUnordered::new();
        for step in batch {
            let invoker = self.invoker.clone();
            let request = InvocationRequest {
                request_id: request_id.to_string(),
                capability_id: step.capability_id.clone(),
                instruction: step.description.clone(),
                context: serde_json::json!({ "phase": "implementation" }),
            };
            let timeout_ms = self.cfg.invocation_timeout_ms;
            tasks.push(tokio::spawn(async move {
                let result = match timeout_ms {
                    Some(ms) => {
                        let budget = std::time::Duration::from_millis(ms);
                        match tokio::time::timeout(budget, invoker.invoke(&request)).await {
                            Ok(r) => InvokeResult::Done(r),
                            Err(_) => InvokeResult::TimedOut,
                        }
                    }
                    None => InvokeResult::Done(invoker.invoke(&request).await),
                };
                (request.capability_id, result)
            }));
        }

        while let Some(joined) = tasks.next().await {
            let (capability_id, result) = joined
                .map_err(|e| Error::Other(format!("Invocation task panicked: {}", e)))?;
            let aborted = flag.load(Ordering::SeqCst);

            let (outcome, artifact, detail) = match &result {
                _ if aborted => (Outcome::Superseded, None, None),
                InvokeResult::TimedOut => (Outcome::Timeout, None, None),
                InvokeResult::Done(Ok(output)) => {
                    (Outcome::Success, Some(output.artifact.clone()), None)
                }
                InvokeResult::Done(Err(e)) => (Outcome::Failure, None, Some(e.to_string())),
            };

            let mut new_span = NewSpan::new(task_type, query, outcome)
                .with_capabilities(&[capability_id.as_str()])
                .with_context(serde_json::json!({ "requestId": request_id }));
            if outcome == Outcome::Timeout {
                new_span = new_span.with_reward(0.0);
            }
            let span_id = match self.trace.append(new_span) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "Trace store unavailable, span dropped");
                    None
                }
            };
            debug!(%capability_id, %outcome, "Invocation recorded");

            let is_agent = self
                .registry
                .get(&capability_id)
                .map(|c| c.is_agent())
                .unwrap_or(false);
            self.with_run(request_id, |r| {
                if let Some(id) = span_id {
                    r.span_ids.push(id);
                }
                if outcome == Outcome::Success && is_agent {
                    r.invoked_agents.insert(capability_id.clone());
                }
                if let Some(a) = artifact {
                    r.artifacts.insert(capability_id.clone(), a);
                }
                if let Some(d) = detail {
                    r.last_error = Some(d);
                }
                r.updated_at = Utc::now();
            })
            .await?;
        }
        Ok(())
    }

    async fn verify_and_complete(&self, request_id: &str) -> Result<WorkflowRun> {
        self.with_run(request_id, |r| {
            r.phase = Phase::Verification;
            r.updated_at = Utc::now();
        })
        .await?;

        loop {
            if self.is_aborted(request_id) {
                return self.get(request_id).await;
            }
            let run = self.get(request_id).await?;
            let artifact = serde_json::Value::Object(run.artifacts.clone());
            let report = self.verifier.run_checks(&artifact).await?;

            if report.passed {
                return self.try_complete(request_id).await;
            }

            let attempts = run.verification_attempts + 1;
            self.with_run(request_id, |r| {
                r.verification_attempts = attempts;
                r.findings.extend(report.findings.iter().cloned());
                r.updated_at = Utc::now();
            })
            .await?;

            if attempts > self.cfg.verification_retry_cap {
                warn!(request_id, attempts, "Verification exhausted, rejecting run");
                let findings = {
                    let run = self.get(request_id).await?;
                    run.findings.clone()
                };
                self.with_run(request_id, |r| {
                    r.phase = Phase::Rejected;
                    r.last_error = Some("verification retry cap exceeded".to_string());
                    r.archived_at = Some(Utc::now());
                    r.updated_at = Utc::now();
                })
                .await?;
                return Err(Error::VerificationExhausted { attempts, findings });
            }

            info!(request_id, attempts, "Verification failed, re-invoking");
            let steps = self.rework_steps(&run, &report.failing_capabilities);
            let refs: Vec<&PlanStep> = steps.iter().collect();
            self.run_batch(&run.task_type, &run.query, request_id, &refs)
                .await?;
        }
    }

    async fn try_complete(&self, request_id: &str) -> Result<WorkflowRun> {
        let run = self.get(request_id).await?;
        let required = self.cfg.min_orchestration_agents;
        if run.decision.is_orchestration() && run.invoked_agents.len() < required {
            let invoked = run.invoked_agents.len();
            warn!(request_id, invoked, required, "Orchestration minimum not met");
            self.with_run(request_id, |r| {
                r.phase = Phase::Implementation;
                r.last_error = Some(format!(
                    "orchestration requires {} distinct agents, {} invoked",
                    required, invoked
                ));
                r.updated_at = Utc::now();
            })
            .await?;
            return Err(Error::MinimumAgentViolation { required, invoked });
        }

        self.with_run(request_id, |r| {
            r.phase = Phase::Complete;
            r.last_error = None;
            r.archived_at = Some(Utc::now());
            r.updated_at = Utc::now();
        })
        .await?;
        info!(request_id, "Run complete");
        self.get(request_id).await
    }

    /// Steps to re-run after a failed verification: the named failing
    /// capabilities, or the whole plan when the report names none.
    fn rework_steps(&self, run: &WorkflowRun, failing: &[String]) -> Vec<PlanStep> {
        let ids: Vec<String> = if failing.is_empty() {
            run.plan
                .as_ref()
                .map(|p| p.steps.iter().map(|s| s.capability_id.clone()).collect())
                .unwrap_or_default()
        } else {
            failing.to_vec()
        };
        ids.into_iter()
            .enumerate()
            .map(|(index, capability_id)| PlanStep {
                index,
                description: format!("rework {}: {}", capability_id, run.query),
                capability_id,
                depends_on: Vec::new(),
            })
            .collect()
    }

    async fn with_run<F>(&self, request_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut WorkflowRun),
    {
        let mut runs = self.runs.lock().await;
        let run = runs
            .get_mut(request_id)
            .ok_or_else(|| Error::NotFound(format!("Run {} not found", request_id)))?;
        f(run);
        Ok(())
    }

    fn abort_flag(&self, request_id: &str) -> Arc<AtomicBool> {
        let mut flags = self.abort_flags.lock().unwrap_or_else(|e| e.into_inner());
        flags
            .entry(request_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    fn is_aborted(&self, request_id: &str) -> bool {
        self.abort_flag(request_id).load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{AcceptAllVerifier, CheckReport, EchoInvoker, InvocationOutput};
    use async_trait::async_trait;
    use conductor_core::{Goal, Priority};
    use conductor_registry::builtin_capabilities;
    use conductor_storage::SqliteTraceStore;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    fn registry() -> Arc<CapabilityRegistry> {
        Arc::new(
            CapabilityRegistry::from_capabilities(builtin_capabilities(), "orchestrator").unwrap(),
        )
    }

    fn decision(who: &[&str], how: &[&str]) -> RoutingDecision {
        RoutingDecision {
            request_id: "req-test".to_string(),
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

    fn machine(
        dir: &TempDir,
        invoker: Arc<dyn CapabilityInvoker>,
        verifier: Arc<dyn Verifier>,
        cfg: WorkflowConfig,
    ) -> (WorkflowMachine, Arc<SqliteTraceStore>) {
        let trace = Arc::new(SqliteTraceStore::open(&dir.path().join("t.db")).unwrap());
        let m = WorkflowMachine::new(registry(), trace.clone(), invoker, verifier, cfg);
        (m, trace)
    }

    struct SlowInvoker {
        delay_ms: u64,
    }

    #[async_trait]
    impl CapabilityInvoker for SlowInvoker {
        async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutput> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            Ok(InvocationOutput {
                summary: request.capability_id.clone(),
                artifact: serde_json::json!({"ok": true}),
            })
        }
    }

    struct FlakyVerifier {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl Verifier for FlakyVerifier {
        async fn run_checks(&self, _: &serde_json::Value) -> Result<CheckReport> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                Ok(CheckReport::failing(&["lint errors"], &[]))
            } else {
                Ok(CheckReport::passing())
            }
        }
    }

    #[tokio::test]
    async fn test_single_agent_run_completes() {
        let dir = TempDir::new().unwrap();
        let (m, trace) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(AcceptAllVerifier),
            WorkflowConfig::default(),
        );

        let run = m
            .start(decision(&["frontend-developer"], &["test-writer"]), "frontend_create", "build ui")
            .await
            .unwrap();
        assert_eq!(run.phase, Phase::AwaitingApproval);
        assert!(run.plan.is_some());

        let run = m.advance("req-test", Approval::Accept).await.unwrap();
        assert_eq!(run.phase, Phase::Complete);
        assert!(run.archived_at.is_some());
        assert_eq!(run.span_ids.len(), 2);

        let spans = trace.recent("frontend_create", 10).unwrap();
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.outcome == Outcome::Success));
    }

    #[tokio::test]
    async fn test_reject_discards_plan_and_replans() {
        let dir = TempDir::new().unwrap();
        let (m, _) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(AcceptAllVerifier),
            WorkflowConfig::default(),
        );

        let first = m
            .start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();
        let first_created = first.plan.as_ref().unwrap().created_at;

        let run = m.advance("req-test", Approval::Reject).await.unwrap();
        assert_eq!(run.phase, Phase::AwaitingApproval);
        assert!(run.plan.as_ref().unwrap().created_at >= first_created);

        // a rejected plan still accepts on the next round
        let run = m.advance("req-test", Approval::Accept).await.unwrap();
        assert_eq!(run.phase, Phase::Complete);
    }

    #[tokio::test]
    async fn test_orchestration_gate_blocks_then_additional_agent_completes() {
        let dir = TempDir::new().unwrap();
        let (m, _) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(AcceptAllVerifier),
            WorkflowConfig::default(),
        );

        m.start(
            decision(&["frontend-developer", "backend-developer"], &[]),
            "general_create",
            "full feature",
        )
        .await
        .unwrap();

        let err = m.advance("req-test", Approval::Accept).await.unwrap_err();
        match err {
            Error::MinimumAgentViolation { required, invoked } => {
                assert_eq!(required, 3);
                assert_eq!(invoked, 2);
            }
            other => panic!("expected MinimumAgentViolation, got {:?}", other),
        }
        assert_eq!(m.get("req-test").await.unwrap().phase, Phase::Implementation);

        m.invoke_additional("req-test", "mobile-developer").await.unwrap();
        let run = m.resume("req-test").await.unwrap();
        assert_eq!(run.phase, Phase::Complete);
        assert_eq!(run.invoked_agents.len(), 3);
    }

    #[tokio::test]
    async fn test_verification_failure_retries_then_passes() {
        let dir = TempDir::new().unwrap();
        let (m, _) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(FlakyVerifier {
                failures_remaining: AtomicU32::new(1),
            }),
            WorkflowConfig::default(),
        );

        m.start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();
        let run = m.advance("req-test", Approval::Accept).await.unwrap();
        assert_eq!(run.phase, Phase::Complete);
        assert_eq!(run.verification_attempts, 1);
        assert_eq!(run.findings, vec!["lint errors"]);
        // the rework invocation recorded a second span
        assert_eq!(run.span_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_verification_exhaustion_rejects_run() {
        let dir = TempDir::new().unwrap();
        let (m, _) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(FlakyVerifier {
                failures_remaining: AtomicU32::new(10),
            }),
            WorkflowConfig::default(),
        );

        m.start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();
        let err = m.advance("req-test", Approval::Accept).await.unwrap_err();
        match err {
            Error::VerificationExhausted { attempts, findings } => {
                assert_eq!(attempts, 3);
                assert_eq!(findings.len(), 3);
            }
            other => panic!("expected VerificationExhausted, got {:?}", other),
        }
        let run = m.get("req-test").await.unwrap();
        assert_eq!(run.phase, Phase::Rejected);
        assert!(run.archived_at.is_some());
    }

    #[tokio::test]
    async fn test_abort_supersedes_inflight_invocations() {
        let dir = TempDir::new().unwrap();
        let (m, trace) = machine(
            &dir,
            Arc::new(SlowInvoker { delay_ms: 100 }),
            Arc::new(AcceptAllVerifier),
            WorkflowConfig::default(),
        );
        let m = Arc::new(m);

        m.start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();

        let advancing = {
            let m = m.clone();
            tokio::spawn(async move { m.advance("req-test", Approval::Accept).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        m.abort("req-test").await.unwrap();

        let run = advancing.await.unwrap().unwrap();
        assert_eq!(run.phase, Phase::Rejected);

        let spans = trace.recent("frontend_create", 10).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].outcome, Outcome::Superseded);
    }

    #[tokio::test]
    async fn test_invocation_timeout_records_zero_reward_span() {
        let dir = TempDir::new().unwrap();
        let cfg = WorkflowConfig {
            invocation_timeout_ms: Some(10),
            ..Default::default()
        };
        let (m, trace) = machine(
            &dir,
            Arc::new(SlowInvoker { delay_ms: 200 }),
            Arc::new(AcceptAllVerifier),
            cfg,
        );

        m.start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();
        let run = m.advance("req-test", Approval::Accept).await.unwrap();
        // verifier accepted the (empty) artifact set, run still completes
        assert_eq!(run.phase, Phase::Complete);

        let spans = trace.recent("frontend_create", 10).unwrap();
        assert_eq!(spans[0].outcome, Outcome::Timeout);
        assert_eq!(spans[0].reward, Some(0.0));
    }

    #[tokio::test]
    async fn test_advance_requires_approval_gate() {
        let dir = TempDir::new().unwrap();
        let (m, _) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(AcceptAllVerifier),
            WorkflowConfig::default(),
        );

        m.start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();
        m.advance("req-test", Approval::Accept).await.unwrap();

        let err = m.advance("req-test", Approval::Accept).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        // a completed run cannot be aborted either
        let err = m.abort("req-test").await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_prunes_only_old_archived_runs() {
        let dir = TempDir::new().unwrap();
        let (m, _) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(AcceptAllVerifier),
            WorkflowConfig::default(),
        );

        m.start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();
        m.advance("req-test", Approval::Accept).await.unwrap();

        // freshly archived, inside the retention window
        assert_eq!(m.cleanup_old_runs().await, 0);

        m.with_run("req-test", |r| {
            r.archived_at = Some(Utc::now() - Duration::days(60));
        })
        .await
        .unwrap();
        assert_eq!(m.cleanup_old_runs().await, 1);
        assert!(m.get("req-test").await.is_err());
    }

    #[tokio::test]
    async fn test_start_prunes_expired_archived_runs() {
        let dir = TempDir::new().unwrap();
        let (m, _) = machine(
            &dir,
            Arc::new(EchoInvoker),
            Arc::new(AcceptAllVerifier),
            WorkflowConfig::default(),
        );

        m.start(decision(&["frontend-developer"], &[]), "frontend_create", "ui")
            .await
            .unwrap();
        m.advance("req-test", Approval::Accept).await.unwrap();
        m.with_run("req-test", |r| {
            r.archived_at = Some(Utc::now() - Duration::days(60));
        })
        .await
        .unwrap();

        let mut next = decision(&["frontend-developer"], &[]);
        next.request_id = "req-next".to_string();
        m.start(next, "frontend_create", "another ui").await.unwrap();

        // starting a run swept out the expired archive
        assert!(m.get("req-test").await.is_err());
        assert!(m.get("req-next").await.is_ok());
    }
}
