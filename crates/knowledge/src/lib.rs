pub mod sync;

pub use sync::{BestPracticeProposal, EnrichedKnowledge, KnowledgeSynchronizer};
