//! Candidate scoring and ranking.
//!
//! ```text
//! score = Σ weight_d · indicator_d
//! ```
//!
//! Indicators are binary presence flags, except dependency proximity
//! (`1 / (1 + depth)`) and, for decisions only, a time-decayed recency term.

use super::candidate::{CandidateKind, ScoringCandidate};
use crate::error::{GovernorError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Weight per scoring dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringWeights {
    pub phase: f64,
    pub current_task: f64,
    pub blocked_task: f64,
    pub recent_failure: f64,
    pub recent_success: f64,
    pub evidence_presence: f64,
    pub decision_recency: f64,
    pub dependency_proximity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            phase: 0.9,
            current_task: 1.0,
            blocked_task: 0.8,
            recent_failure: 0.7,
            recent_success: 0.3,
            evidence_presence: 0.4,
            decision_recency: 0.6,
            dependency_proximity: 0.5,
        }
    }
}

impl ScoringWeights {
    fn fields(&self) -> [(&'static str, f64); 8] {
        [
            ("phase", self.phase),
            ("currentTask", self.current_task),
            ("blockedTask", self.blocked_task),
            ("recentFailure", self.recent_failure),
            ("recentSuccess", self.recent_success),
            ("evidencePresence", self.evidence_presence),
            ("decisionRecency", self.decision_recency),
            ("dependencyProximity", self.dependency_proximity),
        ]
    }
}

/// Shape of the decision recency curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayMode {
    /// `max(0, 1 - age / (2 · half_life))`
    Linear,
    /// `2^(-age / half_life)`
    Exponential,
}

/// Decision recency decay settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecisionDecay {
    pub mode: DecayMode,
    pub half_life_hours: f64,
}

impl Default for DecisionDecay {
    fn default() -> Self {
        Self {
            mode: DecayMode::Exponential,
            half_life_hours: 24.0,
        }
    }
}

impl DecisionDecay {
    /// Recency factor in `[0, 1]`. Non-positive ages always give `1`.
    pub fn factor(&self, age_hours: f64) -> f64 {
        if age_hours <= 0.0 {
            return 1.0;
        }
        match self.mode {
            DecayMode::Exponential => 2f64.powf(-age_hours / self.half_life_hours),
            DecayMode::Linear => (1.0 - age_hours / (2.0 * self.half_life_hours)).max(0.0),
        }
    }
}

/// Context allocator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextScoringConfig {
    /// When `false`, the allocator falls back to a fixed order (phase,
    /// current task, key decisions, peer activity). Default: `true`.
    pub enabled: bool,
    /// Ranked candidates kept before budget filling. Default: 12.
    pub max_candidates: usize,
    pub weights: ScoringWeights,
    pub decision_decay: DecisionDecay,
    /// Token budget for everything injected before one turn. Default: 600.
    pub max_injection_tokens: usize,
}

impl Default for ContextScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_candidates: 12,
            weights: ScoringWeights::default(),
            decision_decay: DecisionDecay::default(),
            max_injection_tokens: 600,
        }
    }
}

impl ContextScoringConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Range checks, run once at load time.
    pub fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 {
            return Err(GovernorError::invalid(
                "context.maxCandidates",
                "must be at least 1",
            ));
        }
        if !(self.decision_decay.half_life_hours > 0.0 && self.decision_decay.half_life_hours.is_finite()) {
            return Err(GovernorError::invalid(
                "context.decisionDecay.halfLifeHours",
                format!("must be a positive number, got {}", self.decision_decay.half_life_hours),
            ));
        }
        for (name, weight) in self.weights.fields() {
            if !(weight >= 0.0 && weight.is_finite()) {
                return Err(GovernorError::invalid(
                    format!("context.weights.{name}"),
                    format!("must be a non-negative number, got {weight}"),
                ));
            }
        }
        Ok(())
    }
}

/// A candidate with its computed score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: ScoringCandidate,
    pub score: f64,
}

/// Score one candidate.
pub fn score_candidate(
    candidate: &ScoringCandidate,
    weights: &ScoringWeights,
    decay: &DecisionDecay,
) -> f64 {
    let s = &candidate.signals;
    let flag = |on: bool| if on { 1.0 } else { 0.0 };

    let mut score = weights.phase * flag(candidate.kind == CandidateKind::Phase)
        + weights.current_task * flag(s.is_current_task)
        + weights.blocked_task * flag(s.is_blocked_task)
        + weights.recent_failure * flag(s.has_recent_failure)
        + weights.recent_success * flag(s.has_recent_success)
        + weights.evidence_presence * flag(s.has_evidence);

    if let Some(depth) = s.dependency_depth {
        score += weights.dependency_proximity / (1.0 + f64::from(depth));
    }
    if candidate.kind == CandidateKind::Decision
        && let Some(age) = s.age_hours
    {
        score += weights.decision_recency * decay.factor(age);
    }
    score
}

/// Score and order candidates.
///
/// Disabled scoring is a pass-through: every score is `0` and input order
/// is kept. Otherwise candidates are sorted by score (desc), priority
/// (desc), then id (asc) and truncated to `max_candidates`.
pub fn rank_candidates(
    candidates: Vec<ScoringCandidate>,
    config: &ContextScoringConfig,
) -> Vec<ScoredCandidate> {
    if !config.enabled {
        return candidates
            .into_iter()
            .map(|candidate| ScoredCandidate {
                candidate,
                score: 0.0,
            })
            .collect();
    }

    let mut ranked: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| ScoredCandidate {
            score: score_candidate(&candidate, &config.weights, &config.decision_decay),
            candidate,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.candidate.priority.cmp(&a.candidate.priority))
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });
    ranked.truncate(config.max_candidates);
    ranked
}
