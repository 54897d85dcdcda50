//! Context assembly: snapshot → candidates → ranked → budget-filled block.
//!
//! The allocator never touches session or window state. It reads the
//! requesting worker's identity (to drop that worker's own peer activity)
//! and a [`ContextSnapshot`] supplied by the host.

use super::budget::{BudgetFill, estimate_tokens, fill_budget};
use super::candidate::{CandidateKind, CandidateSignals, ScoringCandidate};
use super::scoring::{ContextScoringConfig, ScoredCandidate, rank_candidates};
use crate::session::{WorkerIdentity, WorkerNaming};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Decisions tried by the fixed (non-scored) order.
pub const KEY_DECISIONS: usize = 3;

/// Header of a rendered injection block.
pub const CONTEXT_HEADER: &str = "[SHARED CONTEXT]";

const PRIORITY_PHASE: i32 = 100;
const PRIORITY_CURRENT_TASK: i32 = 90;
const PRIORITY_BLOCKED_TASK: i32 = 80;
const PRIORITY_DECISION: i32 = 60;
const PRIORITY_TASK: i32 = 40;
const PRIORITY_AGENT_CONTEXT: i32 = 30;

// ── Snapshot model ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in progress"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    /// References to artifacts backing the task's progress (files, test runs).
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Hops from the current task in the dependency graph, if related.
    #[serde(default)]
    pub dependency_depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub id: String,
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

/// Recent activity reported by another worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerActivity {
    pub worker: String,
    pub summary: String,
    pub at: DateTime<Utc>,
}

/// Shared project state the host exposes for injection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub phase: Option<String>,
    pub current_task_id: Option<String>,
    pub tasks: Vec<TaskContext>,
    pub decisions: Vec<DecisionRecord>,
    pub peer_activity: Vec<PeerActivity>,
}

// ── Injection result ───────────────────────────────────────────────

/// Candidates chosen for one turn. `used_tokens` counts the rendered block,
/// header included.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextInjection {
    pub entries: Vec<ScoredCandidate>,
    pub skipped: usize,
    pub used_tokens: usize,
    pub max_tokens: usize,
}

impl ContextInjection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One text block, or `None` when nothing was selected.
    pub fn render(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let mut out = String::from(CONTEXT_HEADER);
        for entry in &self.entries {
            out.push_str(&entry_line(&entry.candidate.text));
        }
        Some(out)
    }

    fn from_fill(fill: BudgetFill<ScoredCandidate>, header_tokens: usize, max_tokens: usize) -> Self {
        let used_tokens = if fill.selected.is_empty() {
            0
        } else {
            header_tokens + fill.used_tokens
        };
        Self {
            skipped: fill.skipped.len(),
            used_tokens,
            max_tokens,
            entries: fill.selected,
        }
    }
}

fn entry_line(text: &str) -> String {
    format!("\n- {text}")
}

// ── Allocator ──────────────────────────────────────────────────────

/// Picks which context snippets a worker sees before its next turn.
#[derive(Debug, Clone, Default)]
pub struct ContextAllocator {
    config: ContextScoringConfig,
    naming: WorkerNaming,
}

impl ContextAllocator {
    pub fn new(config: ContextScoringConfig, naming: WorkerNaming) -> Self {
        Self { config, naming }
    }

    pub fn config(&self) -> &ContextScoringConfig {
        &self.config
    }

    /// Turn a snapshot into scoring candidates for `requester`.
    ///
    /// Peer activity from workers sharing the requester's base name is
    /// dropped; a worker does not need its own activity echoed back.
    pub fn build_candidates(
        &self,
        snapshot: &ContextSnapshot,
        requester: &WorkerIdentity,
        now: DateTime<Utc>,
    ) -> Vec<ScoringCandidate> {
        let mut out = Vec::new();

        if let Some(phase) = snapshot.phase.as_deref().filter(|p| !p.is_empty()) {
            out.push(ScoringCandidate::new(
                "phase",
                CandidateKind::Phase,
                format!("Current phase: {phase}"),
                PRIORITY_PHASE,
            ));
        }

        for task in &snapshot.tasks {
            let is_current = snapshot.current_task_id.as_deref() == Some(task.id.as_str());
            let is_blocked = task.status == TaskStatus::Blocked;
            let priority = if is_current {
                PRIORITY_CURRENT_TASK
            } else if is_blocked {
                PRIORITY_BLOCKED_TASK
            } else {
                PRIORITY_TASK
            };
            let mut text = format!("Task {} ({}): {}", task.id, task.status, task.title);
            if !task.evidence.is_empty() {
                text.push_str(&format!(" [evidence: {}]", task.evidence.join(", ")));
            }
            out.push(
                ScoringCandidate::new(format!("task:{}", task.id), CandidateKind::Task, text, priority)
                    .with_signals(CandidateSignals {
                        is_current_task: is_current,
                        is_blocked_task: is_blocked,
                        has_recent_failure: task.status == TaskStatus::Failed,
                        has_recent_success: task.status == TaskStatus::Completed,
                        has_evidence: !task.evidence.is_empty(),
                        dependency_depth: task.dependency_depth,
                        age_hours: None,
                    }),
            );
        }

        for decision in &snapshot.decisions {
            let age_hours = (now - decision.recorded_at).num_seconds() as f64 / 3600.0;
            out.push(
                ScoringCandidate::new(
                    format!("decision:{}", decision.id),
                    CandidateKind::Decision,
                    format!("Decision: {}", decision.summary),
                    PRIORITY_DECISION,
                )
                .with_signals(CandidateSignals {
                    age_hours: Some(age_hours),
                    ..Default::default()
                }),
            );
        }

        let own_base = requester.base_name();
        for (i, peer) in snapshot.peer_activity.iter().enumerate() {
            if !requester.is_root() && self.naming.identify(&peer.worker).base_name() == own_base {
                continue;
            }
            out.push(ScoringCandidate::new(
                format!("agent:{i}:{}", peer.worker),
                CandidateKind::AgentContext,
                format!("{}: {}", peer.worker, peer.summary),
                PRIORITY_AGENT_CONTEXT,
            ));
        }

        out
    }

    /// Select the context block for `requester` within the token budget.
    pub fn assemble(
        &self,
        snapshot: &ContextSnapshot,
        requester: &WorkerIdentity,
        now: DateTime<Utc>,
    ) -> ContextInjection {
        let candidates = self.build_candidates(snapshot, requester, now);
        let ordered = if self.config.enabled {
            rank_candidates(candidates, &self.config)
        } else {
            fixed_order(candidates)
        };
        // Charge the header once and each entry as rendered, so the whole
        // block stays within the budget.
        let max_tokens = self.config.max_injection_tokens;
        let header_tokens = estimate_tokens(CONTEXT_HEADER);
        let fill = fill_budget(ordered, max_tokens.saturating_sub(header_tokens), |c| {
            estimate_tokens(&entry_line(&c.candidate.text))
        });
        debug!(worker = %requester, scored = self.config.enabled, "{}", fill.to_log_string());
        ContextInjection::from_fill(fill, header_tokens, max_tokens)
    }
}

/// Fixed order for disabled scoring: phase, current task, up to
/// [`KEY_DECISIONS`] most recent decisions, then peer activity.
fn fixed_order(candidates: Vec<ScoringCandidate>) -> Vec<ScoredCandidate> {
    let mut phase = Vec::new();
    let mut current = Vec::new();
    let mut decisions = Vec::new();
    let mut peers = Vec::new();
    for c in candidates {
        match c.kind {
            CandidateKind::Phase => phase.push(c),
            CandidateKind::Task if c.signals.is_current_task => current.push(c),
            CandidateKind::Task => {}
            CandidateKind::Decision => decisions.push(c),
            CandidateKind::AgentContext => peers.push(c),
        }
    }

    // Newest first; the snapshot may list decisions in any order.
    decisions.sort_by(|a, b| {
        let age = |c: &ScoringCandidate| c.signals.age_hours.unwrap_or(f64::MAX);
        age(a).total_cmp(&age(b)).then_with(|| a.id.cmp(&b.id))
    });
    decisions.truncate(KEY_DECISIONS);

    phase
        .into_iter()
        .chain(current)
        .chain(decisions)
        .chain(peers)
        .map(|candidate| ScoredCandidate {
            candidate,
            score: 0.0,
        })
        .collect()
}
