pub mod knowledge_cmd;
pub mod onboard;
pub mod registry_cmd;
pub mod reward;
pub mod route;
pub mod run_cmd;
pub mod status;
pub mod trace_cmd;

use conductor_core::{Config, Paths};
use conductor_knowledge::KnowledgeSynchronizer;
use conductor_registry::CapabilityRegistry;
use conductor_storage::{SqliteKnowledgeStore, SqliteTraceStore};
use conductor_workflow::{AcceptAllVerifier, Conductor, EchoInvoker};
use std::sync::Arc;

/// Shared handles behind every subcommand.
pub struct App {
    pub paths: Paths,
    pub config: Config,
    pub registry: Arc<CapabilityRegistry>,
    pub trace: Arc<SqliteTraceStore>,
    pub knowledge: Arc<SqliteKnowledgeStore>,
}

impl App {
    pub fn open() -> anyhow::Result<Self> {
        let paths = Paths::new();
        paths.ensure_dirs()?;
        let config = Config::load(&paths.config_file())?;
        let registry = Arc::new(CapabilityRegistry::load_or_builtin(
            &paths.catalog_file(),
            &config.router.fallback_capability,
        )?);
        let trace = Arc::new(SqliteTraceStore::open(&paths.trace_db())?);
        let knowledge = Arc::new(SqliteKnowledgeStore::open(&paths.knowledge_db())?);
        Ok(Self {
            paths,
            config,
            registry,
            trace,
            knowledge,
        })
    }

    /// Full facade with the built-in echo invoker attached.
    pub fn conductor(&self) -> Conductor {
        Conductor::new(
            self.registry.clone(),
            self.trace.clone(),
            self.knowledge.clone(),
            Arc::new(EchoInvoker),
            Arc::new(AcceptAllVerifier),
            self.config.clone(),
        )
    }

    pub fn synchronizer(&self) -> KnowledgeSynchronizer {
        KnowledgeSynchronizer::new(
            self.trace.clone(),
            self.knowledge.clone(),
            self.config.knowledge.clone(),
        )
    }
}
