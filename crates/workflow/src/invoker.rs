use async_trait::async_trait;
use conductor_core::Result;

/// One unit of work handed to a capability provider.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub request_id: String,
    pub capability_id: String,
    pub instruction: String,
    pub context: serde_json::Value,
}

/// What a capability provider produced.
#[derive(Debug, Clone)]
pub struct InvocationOutput {
    pub summary: String,
    pub artifact: serde_json::Value,
}

/// Seam to the external system that actually performs a routed task
/// (typically an LLM call). The state machine only sees this trait.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutput>;
}

/// Result of a verification pass over a run's accumulated artifacts.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub passed: bool,
    pub findings: Vec<String>,
    /// Capabilities whose output failed; empty means re-run everything.
    pub failing_capabilities: Vec<String>,
}

impl CheckReport {
    pub fn passing() -> Self {
        Self {
            passed: true,
            findings: Vec::new(),
            failing_capabilities: Vec::new(),
        }
    }

    pub fn failing(findings: &[&str], failing_capabilities: &[&str]) -> Self {
        Self {
            passed: false,
            findings: findings.iter().map(|s| s.to_string()).collect(),
            failing_capabilities: failing_capabilities.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Seam to the external verification collaborator.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn run_checks(&self, artifact: &serde_json::Value) -> Result<CheckReport>;
}

/// Invoker that acknowledges every request with a canned artifact.
/// Placeholder wiring for surfaces with no provider attached (CLI
/// dry-runs, tests).
pub struct EchoInvoker;

#[async_trait]
impl CapabilityInvoker for EchoInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutput> {
        Ok(InvocationOutput {
            summary: format!("{} handled '{}'", request.capability_id, request.instruction),
            artifact: serde_json::json!({
                "capability": request.capability_id,
                "instruction": request.instruction,
            }),
        })
    }
}

/// Verifier that accepts every artifact. Same role as [`EchoInvoker`].
pub struct AcceptAllVerifier;

#[async_trait]
impl Verifier for AcceptAllVerifier {
    async fn run_checks(&self, _artifact: &serde_json::Value) -> Result<CheckReport> {
        Ok(CheckReport::passing())
    }
}
