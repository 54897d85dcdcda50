//! Scoring candidates: optional context snippets competing for budget.

use super::budget::estimate_tokens;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a candidate describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Phase,
    Task,
    Decision,
    AgentContext,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Phase => write!(f, "phase"),
            CandidateKind::Task => write!(f, "task"),
            CandidateKind::Decision => write!(f, "decision"),
            CandidateKind::AgentContext => write!(f, "agent_context"),
        }
    }
}

/// Scoring inputs attached to a candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSignals {
    pub is_current_task: bool,
    pub is_blocked_task: bool,
    pub has_recent_failure: bool,
    pub has_recent_success: bool,
    pub has_evidence: bool,
    /// Hops from the current task in the dependency graph, if related.
    pub dependency_depth: Option<u32>,
    /// Age in hours. Only decisions use it (recency decay).
    pub age_hours: Option<f64>,
}

/// One candidate snippet, built fresh for every context assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringCandidate {
    pub id: String,
    pub kind: CandidateKind,
    pub text: String,
    pub estimated_tokens: usize,
    /// Fixed tie-breaker, higher first.
    pub priority: i32,
    pub signals: CandidateSignals,
}

impl ScoringCandidate {
    /// Create a candidate; the token estimate is computed from `text`.
    pub fn new(
        id: impl Into<String>,
        kind: CandidateKind,
        text: impl Into<String>,
        priority: i32,
    ) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            kind,
            estimated_tokens: estimate_tokens(&text),
            text,
            priority,
            signals: CandidateSignals::default(),
        }
    }

    pub fn with_signals(mut self, signals: CandidateSignals) -> Self {
        self.signals = signals;
        self
    }
}
