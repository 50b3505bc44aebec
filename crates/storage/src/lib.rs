pub mod knowledge;
pub mod trace;

pub use knowledge::{KnowledgeStore, SqliteKnowledgeStore};
pub use trace::{SqliteTraceStore, TraceStore};
