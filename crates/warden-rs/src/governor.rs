//! Hook entry points for the host orchestrator.
//!
//! [`Governor`] owns the [`SessionRegistry`], the [`CircuitBreaker`], and the
//! [`ContextAllocator`]. The host calls four hooks:
//!
//! | Hook | When |
//! |------|------|
//! | [`on_worker_delegated`](Governor::on_worker_delegated) | control moves to a worker (`""` = back to root) |
//! | [`on_tool_before`](Governor::on_tool_before) | a worker is about to run a tool |
//! | [`on_tool_after`](Governor::on_tool_after) | the tool returned (or produced nothing) |
//! | [`on_messages_assembled`](Governor::on_messages_assembled) | the next prompt is ready to send |
//!
//! Each hook runs to completion without suspending. The async signatures
//! match the host's calling convention; every hook has a synchronous `*_at`
//! twin that takes the clock as a parameter.

use crate::breaker::{CircuitBreaker, ToolCall, directive_for, prepend_directive};
use crate::config::GovernorConfig;
use crate::context::{ContextAllocator, ContextInjection, ContextSnapshot};
use crate::error::Result;
use crate::session::registry::lock;
use crate::session::{SessionRegistry, WindowSnapshot, WorkerIdentity, WorkerNaming};
use crate::{Message, MessageRole};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Action returned by [`Governor::on_tool_before`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    /// Allow the tool to execute.
    Proceed,
    /// Block the tool with the given reason (sent to the worker).
    Block(String),
}

impl HookAction {
    pub fn is_blocked(&self) -> bool {
        matches!(self, HookAction::Block(_))
    }
}

/// Runtime governor for one host process.
#[derive(Debug)]
pub struct Governor {
    naming: WorkerNaming,
    registry: SessionRegistry,
    breaker: CircuitBreaker,
    allocator: ContextAllocator,
}

impl Default for Governor {
    fn default() -> Self {
        Self::new(GovernorConfig::default())
    }
}

impl Governor {
    /// Build a governor from an already validated config.
    pub fn new(config: GovernorConfig) -> Self {
        let GovernorConfig {
            naming,
            circuit_breaker,
            context,
            retention,
        } = config;
        Self {
            allocator: ContextAllocator::new(context, naming.clone()),
            naming,
            registry: SessionRegistry::new(retention),
            breaker: CircuitBreaker::new(circuit_breaker),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn allocator(&self) -> &ContextAllocator {
        &self.allocator
    }

    /// Parse a raw worker name with the configured naming rules.
    pub fn identify(&self, worker: &str) -> WorkerIdentity {
        self.naming.identify(worker)
    }

    // ── Async hooks ────────────────────────────────────────────────

    pub async fn on_worker_delegated(&self, session_id: &str, worker: &str) {
        self.worker_delegated_at(session_id, worker, Utc::now());
    }

    pub async fn on_tool_before(
        &self,
        session_id: &str,
        worker: &str,
        tool: &str,
        arguments: &str,
    ) -> Result<HookAction> {
        self.tool_before_at(session_id, worker, tool, arguments, Utc::now())
    }

    pub async fn on_tool_after(&self, session_id: &str, tool: &str, succeeded: bool) -> Result<()> {
        self.tool_after_at(session_id, tool, succeeded, Utc::now())
    }

    pub async fn on_messages_assembled(
        &self,
        session_id: &str,
        mut messages: Vec<Message>,
    ) -> Vec<Message> {
        self.messages_assembled_at(session_id, &mut messages);
        messages
    }

    /// Insert the budgeted context block for the session's active worker.
    pub async fn inject_context(
        &self,
        session_id: &str,
        snapshot: &ContextSnapshot,
        mut messages: Vec<Message>,
    ) -> Vec<Message> {
        self.inject_context_at(session_id, snapshot, &mut messages, Utc::now());
        messages
    }

    // ── Synchronous variants ───────────────────────────────────────

    /// Record that control moved to `worker` (`""` means back to root).
    ///
    /// A non-root worker gets a fresh window unless a delegation to it is
    /// already active.
    pub fn worker_delegated_at(&self, session_id: &str, worker: &str, now: DateTime<Utc>) {
        let identity = self.naming.identify(worker);
        let handle = self.registry.ensure_session(session_id, &identity, now);
        let mut session = lock(&handle);
        session.last_worker_event_time = now;

        if identity.is_root() {
            session.delegation_active = false;
            debug!(session = session_id, "control returned to root");
            return;
        }
        if session.delegation_active {
            return;
        }
        if let Some(window) = session.begin_invocation(&identity, now, self.registry.retention()) {
            info!(session = session_id, worker = %identity, invocation = window.id, "worker delegated");
        }
        session.delegation_active = true;
    }

    /// Admit or block a tool call. Budget rejections become
    /// [`HookAction::Block`]; any other error is returned.
    pub fn tool_before_at(
        &self,
        session_id: &str,
        worker: &str,
        tool: &str,
        arguments: &str,
        now: DateTime<Utc>,
    ) -> Result<HookAction> {
        let identity = self.naming.identify(worker);
        let handle = self.registry.ensure_session(session_id, &identity, now);
        let mut session = lock(&handle);
        match self.breaker.before(
            &mut session,
            ToolCall::new(tool, arguments),
            now,
            self.registry.retention(),
        ) {
            Ok(_) => Ok(HookAction::Proceed),
            Err(e) if e.is_budget_rejection() => Ok(HookAction::Block(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Record a tool result. The session must already exist.
    pub fn tool_after_at(
        &self,
        session_id: &str,
        tool: &str,
        succeeded: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let handle = self.registry.require(session_id)?;
        let mut session = lock(&handle);
        self.breaker.after(&mut session, succeeded, now);
        debug!(session = session_id, tool, succeeded, "tool result recorded");
        Ok(())
    }

    /// Prepend the active window's directive, if any, to the most recent
    /// user message. Returns whether `messages` changed.
    pub fn messages_assembled_at(&self, session_id: &str, messages: &mut Vec<Message>) -> bool {
        let Some(handle) = self.registry.get(session_id) else {
            return false;
        };
        let directive = {
            let session = lock(&handle);
            session.active_window().and_then(directive_for)
        };
        directive.is_some_and(|d| prepend_directive(messages, &d))
    }

    /// Assemble context for the session's active worker and insert it as a
    /// system message after the leading system messages. Unknown sessions
    /// are treated as the root worker.
    pub fn inject_context_at(
        &self,
        session_id: &str,
        snapshot: &ContextSnapshot,
        messages: &mut Vec<Message>,
        now: DateTime<Utc>,
    ) -> ContextInjection {
        let requester = match self.registry.get(session_id) {
            Some(handle) => lock(&handle).active_worker().clone(),
            None => self.naming.identify(""),
        };
        let injection = self.allocator.assemble(snapshot, &requester, now);
        if let Some(block) = injection.render() {
            let at = messages
                .iter()
                .position(|m| m.role != MessageRole::System)
                .unwrap_or(messages.len());
            messages.insert(at, Message::system(block));
        }
        injection
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn window_snapshot(&self, session_id: &str) -> Option<WindowSnapshot> {
        self.window_snapshot_at(session_id, Utc::now())
    }

    /// Consumption of the session's active window.
    pub fn window_snapshot_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<WindowSnapshot> {
        self.registry
            .get_active_window(session_id)
            .map(|w| w.snapshot(now))
    }

    /// Release a finished session. Returns whether it existed.
    pub fn end_session(&self, session_id: &str) -> bool {
        let removed = self.registry.remove(session_id);
        if removed {
            debug!(session = session_id, "session ended");
        }
        removed
    }
}
