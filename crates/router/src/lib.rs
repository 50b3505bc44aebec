pub mod engine;
pub mod intent;
pub mod ranker;

pub use engine::{derive_request_id, derive_task_type, DecisionEngine, RequestContext, RouteOutcome};
pub use intent::{detect_goal, detect_priority, CandidateScore, IntentAnalyzer, IntentSignal};
pub use ranker::{AdaptiveRanker, RankerBias};
