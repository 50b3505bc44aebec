pub mod invoker;
pub mod machine;
pub mod plan;
pub mod runtime;

pub use invoker::{
    AcceptAllVerifier, CapabilityInvoker, CheckReport, EchoInvoker, InvocationOutput,
    InvocationRequest, Verifier,
};
pub use machine::{Approval, Phase, WorkflowMachine, WorkflowRun};
pub use plan::{PlanArtifact, PlanStep};
pub use runtime::Conductor;
