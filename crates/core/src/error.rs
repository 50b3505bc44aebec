use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Trace or Knowledge Store unreachable. Non-fatal: routing proceeds
    /// unweighted and knowledge reads skip live-stat enrichment.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Two or more domains scored within epsilon of the top and no
    /// explicit override was present.
    #[error("Ambiguous intent between: {}", candidates.join(", "))]
    AmbiguousIntent { candidates: Vec<String> },

    #[error("No capability matches request: {0}")]
    NoMatchingCapability(String),

    /// Orchestration-mode run attempted to complete with fewer distinct
    /// invoked agents than required. Correctable: add agents and retry.
    #[error("Orchestration requires {required} agents, only {invoked} invoked")]
    MinimumAgentViolation { required: usize, invoked: usize },

    /// Verification retry cap exceeded. Terminal for the run.
    #[error("Verification exhausted after {attempts} attempts: {}", findings.join("; "))]
    VerificationExhausted {
        attempts: u32,
        findings: Vec<String>,
    },

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
