//! Advisory directives prepended to outgoing worker messages.
//!
//! Blocking happens in [`CircuitBreaker::before`](super::CircuitBreaker::before);
//! this only tells the worker why its tools stopped working (or are about to)
//! so it can wind down on its own.

use crate::session::Window;
use crate::{Message, MessageRole};

/// Marker at the start of every directive. Used to avoid stacking the same
/// directive onto a message twice.
pub const DIRECTIVE_MARKER: &str = "[GUARDRAIL";

/// Directive for a window's current state, if it needs one.
pub fn directive_for(window: &Window) -> Option<String> {
    if window.hard_limit_hit {
        Some(format!(
            "[GUARDRAIL: CIRCUIT BREAKER OPEN] {} (invocation #{}) has hit a hard limit. \
             Do not call any more tools. Summarize what you completed, what remains, \
             and any blockers, then return control to the orchestrator.",
            window.worker, window.id
        ))
    } else if window.warning_issued {
        let reason = window.warning_reason.as_deref().unwrap_or("budget nearly used");
        Some(format!(
            "[GUARDRAIL WARNING] {} is approaching its budget: {reason}. \
             Finish the current step, avoid exploratory tool calls, and prepare a summary.",
            window.worker
        ))
    } else {
        None
    }
}

/// Prepend `directive` to the most recent user message. Appends a new user
/// message when there is none.
///
/// A message that already leads with a directive has that paragraph
/// replaced, so a warning gives way to a later stop. Returns `false` only
/// when the leading directive is already `directive`.
pub fn prepend_directive(messages: &mut Vec<Message>, directive: &str) -> bool {
    let Some(target) = messages
        .iter_mut()
        .rev()
        .find(|m| m.role == MessageRole::User)
    else {
        messages.push(Message::user(directive));
        return true;
    };

    match target.content.as_mut() {
        Some(content) if content.starts_with(DIRECTIVE_MARKER) => {
            let (existing, rest) = match content.split_once("\n\n") {
                Some((existing, rest)) => (existing, Some(rest)),
                None => (content.as_str(), None),
            };
            if existing == directive {
                return false;
            }
            let replaced = match rest {
                Some(rest) => format!("{directive}\n\n{rest}"),
                None => directive.to_string(),
            };
            *content = replaced;
            true
        }
        Some(content) => {
            *content = format!("{directive}\n\n{content}");
            true
        }
        None => {
            target.content = Some(directive.to_string());
            true
        }
    }
}
