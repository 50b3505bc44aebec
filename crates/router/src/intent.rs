use conductor_core::{Goal, Priority};
use conductor_registry::CapabilityRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Precompiled @-mention pattern, e.g. "@security-auditor".
static MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@([A-Za-z0-9][A-Za-z0-9_-]*)").expect("mention regex is valid")
});

/// Score contributed by an exact multi-word phrase match.
const PHRASE_SCORE: f64 = 3.0;
/// Score contributed by a single keyword match.
const KEYWORD_SCORE: f64 = 1.0;

/// One candidate capability with its raw trigger score.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub capability_id: String,
    /// Family tag used for cross-family ambiguity checks.
    pub family: String,
    pub score: f64,
}

/// Output of intent analysis for one request.
#[derive(Debug, Clone)]
pub struct IntentSignal {
    /// Candidates ranked by score descending, id ascending.
    pub candidates: Vec<CandidateScore>,
    /// Explicitly referenced capability; bypasses scoring entirely.
    pub explicit_override: Option<String>,
    pub goal: Goal,
    pub priority: Priority,
}

/// Converts a raw request string into ranked candidate capabilities.
///
/// Scans trigger patterns across the whole registry: multi-word patterns
/// match as exact phrases and outweigh single-keyword hits. An
/// `@capability-id` mention (or a caller-supplied marker) short-circuits
/// scoring.
pub struct IntentAnalyzer {
    registry: Arc<CapabilityRegistry>,
}

impl IntentAnalyzer {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn analyze(&self, request: &str, explicit_marker: Option<&str>) -> IntentSignal {
        let goal = detect_goal(request);
        let priority = detect_priority(request);

        if let Some(id) = self.find_override(request, explicit_marker) {
            debug!(capability = %id, "Explicit capability reference, bypassing scoring");
            return IntentSignal {
                candidates: Vec::new(),
                explicit_override: Some(id),
                goal,
                priority,
            };
        }

        let input_lower = request.to_lowercase();
        let tokens: BTreeSet<&str> = input_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut candidates: Vec<CandidateScore> = Vec::new();
        for cap in self.registry.list_capabilities() {
            let mut score = 0.0;
            for pattern in &cap.trigger_patterns {
                let p = pattern.to_lowercase();
                if p.contains(char::is_whitespace) {
                    if input_lower.contains(&p) {
                        score += PHRASE_SCORE;
                    }
                } else if tokens.contains(p.as_str()) {
                    score += KEYWORD_SCORE;
                }
            }
            if score > 0.0 {
                candidates.push(CandidateScore {
                    capability_id: cap.id.clone(),
                    family: cap.family().to_string(),
                    score,
                });
            }
        }

        // Deterministic ranking: score descending, then id ascending.
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.capability_id.cmp(&b.capability_id))
        });

        IntentSignal {
            candidates,
            explicit_override: None,
            goal,
            priority,
        }
    }

    /// An override counts only when it names a registered capability;
    /// mentions of unknown ids fall through to scoring.
    fn find_override(&self, request: &str, explicit_marker: Option<&str>) -> Option<String> {
        if let Some(marker) = explicit_marker {
            if self.registry.get(marker).is_some() {
                return Some(marker.to_string());
            }
        }
        for m in MENTION.captures_iter(request) {
            let id = &m[1];
            if self.registry.get(id).is_some() {
                return Some(id.to_string());
            }
        }
        None
    }
}

/// Goal keyword tables, checked in order; first hit wins.
pub fn detect_goal(request: &str) -> Goal {
    let lower = request.to_lowercase();
    const FIX: &[&str] = &["fix", "bug", "broken", "crash", "regression", "not working"];
    const ANALYZE: &[&str] = &["review", "audit", "analyze", "explain", "investigate", "assess"];
    const OPERATE: &[&str] = &["deploy", "migrate", "configure", "release", "provision", "rollback"];
    const ENHANCE: &[&str] = &["add", "improve", "enhance", "extend", "refactor", "optimize", "update"];
    const CREATE: &[&str] = &["create", "build", "implement", "scaffold", "write", "new"];

    for (words, goal) in [
        (FIX, Goal::Fix),
        (ANALYZE, Goal::Analyze),
        (OPERATE, Goal::Operate),
        (ENHANCE, Goal::Enhance),
        (CREATE, Goal::Create),
    ] {
        if words.iter().any(|w| lower.contains(w)) {
            return goal;
        }
    }
    Goal::General
}

pub fn detect_priority(request: &str) -> Priority {
    let lower = request.to_lowercase();
    const URGENT: &[&str] = &["urgent", "asap", "immediately", "critical", "hotfix", "right now"];
    const BACKGROUND: &[&str] = &["whenever", "low priority", "eventually", "someday", "background"];

    if URGENT.iter().any(|w| lower.contains(w)) {
        Priority::Urgent
    } else if BACKGROUND.iter().any(|w| lower.contains(w)) {
        Priority::Background
    } else {
        Priority::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_registry::builtin_capabilities;

    fn analyzer() -> IntentAnalyzer {
        let registry = Arc::new(
            CapabilityRegistry::from_capabilities(builtin_capabilities(), "orchestrator").unwrap(),
        );
        IntentAnalyzer::new(registry)
    }

    #[test]
    fn test_phrase_beats_keyword() {
        let a = analyzer();
        let signal = a.analyze("Add dark mode to existing app", None);
        assert!(signal.explicit_override.is_none());
        let top = &signal.candidates[0];
        assert_eq!(top.capability_id, "frontend-developer");
        // "dark mode" is a phrase match
        assert!(top.score >= PHRASE_SCORE);
        assert_eq!(signal.goal, Goal::Enhance);
    }

    #[test]
    fn test_explicit_mention_bypasses_scoring() {
        let a = analyzer();
        let signal = a.analyze("@security-auditor review this api endpoint", None);
        assert_eq!(signal.explicit_override.as_deref(), Some("security-auditor"));
        assert!(signal.candidates.is_empty());
    }

    #[test]
    fn test_unknown_mention_falls_through() {
        let a = analyzer();
        let signal = a.analyze("@nobody-here fix the css layout", None);
        assert!(signal.explicit_override.is_none());
        assert!(!signal.candidates.is_empty());
    }

    #[test]
    fn test_marker_override() {
        let a = analyzer();
        let signal = a.analyze("do the thing", Some("backend-developer"));
        assert_eq!(signal.explicit_override.as_deref(), Some("backend-developer"));
    }

    #[test]
    fn test_cross_family_tie_is_visible_in_scores() {
        let a = analyzer();
        // one mobile keyword, one security keyword: tied across families
        let signal = a.analyze("mobile security", None);
        let top = &signal.candidates[0];
        let second = &signal.candidates[1];
        assert_eq!(top.score, second.score);
        assert_ne!(top.family, second.family);
    }

    #[test]
    fn test_no_match_yields_empty_candidates() {
        let a = analyzer();
        let signal = a.analyze("zzz qqq", None);
        assert!(signal.candidates.is_empty());
    }

    #[test]
    fn test_goal_detection() {
        assert_eq!(detect_goal("fix the login crash"), Goal::Fix);
        assert_eq!(detect_goal("add dark mode"), Goal::Enhance);
        assert_eq!(detect_goal("build a new dashboard"), Goal::Create);
        assert_eq!(detect_goal("review this pr"), Goal::Analyze);
        assert_eq!(detect_goal("deploy to staging"), Goal::Operate);
        assert_eq!(detect_goal("hello"), Goal::General);
    }

    #[test]
    fn test_priority_detection() {
        assert_eq!(detect_priority("urgent: prod is down"), Priority::Urgent);
        assert_eq!(detect_priority("whenever you get to it"), Priority::Background);
        assert_eq!(detect_priority("add a button"), Priority::Normal);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let a = analyzer();
        let s1 = a.analyze("api endpoint and ui component", None);
        let s2 = a.analyze("api endpoint and ui component", None);
        let ids1: Vec<_> = s1.candidates.iter().map(|c| &c.capability_id).collect();
        let ids2: Vec<_> = s2.candidates.iter().map(|c| &c.capability_id).collect();
        assert_eq!(ids1, ids2);
    }
}
