//! Convenience re-exports for common `warden-rs` types.
//!
//! ```ignore
//! use warden_rs::prelude::*;
//! ```
//!
//! Covers the hook surface ([`Governor`], [`HookAction`], [`Message`]),
//! configuration, and the context snapshot model. Lower-level pieces
//! (fingerprints, limit evaluation, scoring functions) stay in their modules.

// ── Hooks ───────────────────────────────────────────────────────────
pub use crate::governor::{Governor, HookAction};
pub use crate::{Message, MessageRole};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::breaker::{CircuitBreakerConfig, ProfileOverride};
pub use crate::config::GovernorConfig;
pub use crate::context::{ContextScoringConfig, DecayMode, DecisionDecay, ScoringWeights};
pub use crate::session::{RetentionConfig, WorkerNaming};

// ── Context snapshots ───────────────────────────────────────────────
pub use crate::context::{
    ContextInjection, ContextSnapshot, DecisionRecord, PeerActivity, TaskContext, TaskStatus,
};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::breaker::LimitBreach;
pub use crate::error::{GovernorError, Result};
