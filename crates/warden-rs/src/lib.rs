//! Runtime governor for LLM worker sessions.
//!
//! `warden-rs` sits between a host orchestrator and the workers it delegates
//! to. It keeps three concerns in one place:
//!
//! 1. **Invocation windows.** Every delegation to a non-root worker opens a
//!    fresh [`Window`](session::Window) with its own counters. Windows are
//!    keyed by the worker's base name and a per-base-name sequence number,
//!    and pruned by age and count.
//!
//! 2. **Circuit breaker.** Each tool call passes
//!    [`CircuitBreaker::before`](breaker::CircuitBreaker::before) and
//!    [`after`](breaker::CircuitBreaker::after). Five budget dimensions are
//!    checked (tool calls, duration, repetitions, consecutive errors, idle
//!    time). The first one exceeded latches the window shut until the next
//!    invocation. An early warning fires once per window.
//!
//! 3. **Context budget.** Before a worker's turn, the
//!    [`ContextAllocator`](context::ContextAllocator) scores candidate
//!    snippets and greedily fills a token budget.
//!
//! # Getting started
//!
//! ```ignore
//! use warden_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GovernorError> {
//!     let config = GovernorConfig::load("warden.json")?;
//!     let governor = Governor::new(config);
//!
//!     governor.on_worker_delegated("session-1", "coder").await;
//!     match governor
//!         .on_tool_before("session-1", "coder", "read_file", r#"{"path":"src/lib.rs"}"#)
//!         .await?
//!     {
//!         HookAction::Proceed => { /* run the tool */ }
//!         HookAction::Block(reason) => { /* send `reason` back to the worker */ }
//!     }
//!     governor.on_tool_after("session-1", "read_file", true).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | Worker identity, invocation windows, [`SessionRegistry`](session::SessionRegistry) |
//! | [`breaker`] | Guardrail profiles, limit evaluation, argument fingerprints, directives |
//! | [`context`] | Token estimation, candidate scoring, budget filling |
//! | [`governor`] | [`Governor`] hook entry points |
//! | [`config`] | [`GovernorConfig`] loading and validation |
//! | [`replay`] | Feed recorded hook events through a [`Governor`] |

pub mod breaker;
pub mod config;
pub mod context;
pub mod error;
pub mod governor;
pub mod prelude;
pub mod replay;
pub mod session;

pub use config::GovernorConfig;
pub use error::{GovernorError, Result};
pub use governor::{Governor, HookAction};

use serde::{Deserialize, Serialize};

// ── Messages ───────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in a worker's outgoing conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
        }
    }
}
