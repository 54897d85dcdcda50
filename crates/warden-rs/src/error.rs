//! Error types for the governor.
//!
//! Only [`GovernorError::BudgetExceeded`] and [`GovernorError::CircuitOpen`]
//! are expected at runtime; the hook layer turns them into
//! [`HookAction::Block`](crate::governor::HookAction::Block) messages that
//! the worker reads. Everything else means the host called us out of order
//! or handed us a bad configuration.

use std::path::PathBuf;

use crate::breaker::LimitBreach;

/// All errors produced by warden-rs.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    // ── Budget enforcement ─────────────────────────────────────────
    /// A budget dimension was exceeded by the call being admitted. The
    /// window is latched by the time this is returned.
    #[error(transparent)]
    BudgetExceeded(LimitBreach),

    /// The window already latched on an earlier call.
    #[error(
        "Circuit breaker open: {worker} (invocation #{invocation}) already hit a hard limit. \
         Stop calling tools and summarize your progress for the orchestrator."
    )]
    CircuitOpen { worker: String, invocation: u64 },

    // ── State inconsistencies ──────────────────────────────────────
    /// A hook referenced a session that was never initialised.
    #[error("unknown session '{0}': delegation must be recorded before tool use")]
    UnknownSession(String),

    // ── Configuration ──────────────────────────────────────────────
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[source] serde_json::Error),

    // ── Replay ─────────────────────────────────────────────────────
    #[error("replay I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl GovernorError {
    /// Whether this error is a budget rejection meant for the worker, as
    /// opposed to a host-side bug.
    pub fn is_budget_rejection(&self) -> bool {
        matches!(
            self,
            GovernorError::BudgetExceeded(_) | GovernorError::CircuitOpen { .. }
        )
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        GovernorError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = GovernorError> = std::result::Result<T, E>;
