pub mod capability;
pub mod config;
pub mod decision;
pub mod error;
pub mod knowledge;
pub mod paths;
pub mod span;

pub use capability::{Capability, CapabilityKind};
pub use config::{Config, KnowledgeConfig, RouterConfig, WorkflowConfig};
pub use decision::{Goal, Priority, RoutingDecision};
pub use error::{Error, Result};
pub use knowledge::{KnowledgeItem, KnowledgeProposal, ProposalStatus};
pub use paths::Paths;
pub use span::{NewSpan, Outcome, Span, TaskStats};
