//! Circuit breaker: admission control over a worker's tool calls.
//!
//! Every tool call passes [`CircuitBreaker::before`] and
//! [`CircuitBreaker::after`]. `before` counts the call, fingerprints its
//! arguments, and checks five budget dimensions in order: tool calls,
//! duration, repetitions, consecutive errors, idle time. The first
//! dimension exceeded latches the window (`hard_limit_hit`) and rejects the
//! call; every later call on that window is rejected without touching
//! state. Only a new invocation clears the latch.
//!
//! Duration and idle limits are evaluated lazily here, never by a timer: a
//! worker that stops calling tools never trips them.
//!
//! - [`profile`]: [`CircuitBreakerConfig`] and [`GuardrailProfile`] resolution.
//! - [`limits`]: [`LimitBreach`], hard-limit evaluation, warnings.
//! - [`fingerprint`]: approximate argument fingerprints.
//! - [`directive`]: advisory text for outgoing messages.

pub mod directive;
pub mod fingerprint;
pub mod limits;
pub mod profile;

pub use directive::{DIRECTIVE_MARKER, directive_for, prepend_directive};
pub use fingerprint::{FALLBACK_FINGERPRINT, fingerprint_arguments, fingerprint_value};
pub use limits::{LimitBreach, evaluate_limits, warning_reason};
pub use profile::{CircuitBreakerConfig, GuardrailProfile, ProfileOverride};

use crate::error::{GovernorError, Result};
use crate::session::{RetentionConfig, Session};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// A tool call about to be admitted.
#[derive(Debug, Clone, Copy)]
pub struct ToolCall<'a> {
    pub tool: &'a str,
    /// Raw JSON arguments.
    pub arguments: &'a str,
}

impl<'a> ToolCall<'a> {
    pub fn new(tool: &'a str, arguments: &'a str) -> Self {
        Self { tool, arguments }
    }
}

/// Outcome of an admitted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Nothing was tracked: breaker disabled, root identity, or a worker
    /// with neither a call cap nor a duration cap.
    Unlimited,
    /// Counted against the active window. `warning` is set only on the call
    /// that first crossed the warning threshold.
    Admitted { warning: Option<String> },
}

/// Enforces guardrail profiles against invocation windows.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Admit or reject `call` for the session's active worker.
    ///
    /// Returns [`GovernorError::CircuitOpen`] when the window latched on an
    /// earlier call and [`GovernorError::BudgetExceeded`] when this call
    /// trips a limit. A missing window is opened lazily (the hook may fire
    /// before delegation bookkeeping completes).
    pub fn before(
        &self,
        session: &mut Session,
        call: ToolCall<'_>,
        now: DateTime<Utc>,
        retention: &RetentionConfig,
    ) -> Result<Admission> {
        session.last_tool_call_time = Some(now);
        if !self.config.enabled {
            return Ok(Admission::Unlimited);
        }

        let worker = session.active_worker().clone();
        if worker.is_root() {
            return Ok(Admission::Unlimited);
        }
        let profile = self.config.resolve(&worker);
        if profile.is_unthrottled() {
            return Ok(Admission::Unlimited);
        }

        if session.active_window().is_none() {
            session.begin_invocation(&worker, now, retention);
            session.delegation_active = true;
        }
        let session_id = session.id().to_string();
        let Some(window) = session.active_window_mut() else {
            // Retention pruned the window it just opened.
            return Ok(Admission::Unlimited);
        };

        if window.hard_limit_hit {
            return Err(GovernorError::CircuitOpen {
                worker: window.worker.clone(),
                invocation: window.id,
            });
        }

        window.tool_calls += 1;
        window.record_call(call.tool, fingerprint_arguments(call.arguments), now);

        if let Some(breach) = evaluate_limits(window, &profile, call.tool, now) {
            window.hard_limit_hit = true;
            warn!(
                session = %session_id,
                worker = %window.worker,
                invocation = window.id,
                dimension = breach.dimension(),
                "circuit breaker tripped: {breach}"
            );
            return Err(GovernorError::BudgetExceeded(breach));
        }

        if !window.warning_issued
            && let Some(reason) = warning_reason(window, &profile, now)
        {
            window.warning_issued = true;
            window.warning_reason = Some(reason.clone());
            info!(
                session = %session_id,
                worker = %window.worker,
                invocation = window.id,
                "budget warning: {reason}"
            );
            return Ok(Admission::Admitted {
                warning: Some(reason),
            });
        }

        Ok(Admission::Admitted { warning: None })
    }

    /// Record a tool result. `succeeded == false` means the result was absent.
    pub fn after(&self, session: &mut Session, succeeded: bool, now: DateTime<Utc>) {
        if let Some(window) = session.active_window_mut() {
            window.record_result(succeeded, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{WorkerIdentity, WorkerNaming};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 14, 0, 0).unwrap()
    }

    fn worker(name: &str) -> WorkerIdentity {
        WorkerNaming::default().identify(name)
    }

    fn delegated(name: &str) -> Session {
        let w = worker(name);
        let mut session = Session::new("s", w.clone(), t0());
        session.begin_invocation(&w, t0(), &RetentionConfig::default());
        session.delegation_active = true;
        session
    }

    fn breaker(max_tool_calls: u32, max_repetitions: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            max_tool_calls,
            max_repetitions,
            max_duration_minutes: 60,
            idle_timeout_minutes: 60,
            ..Default::default()
        })
    }

    fn call(n: u32) -> String {
        format!(r#"{{"path":"file-{n}.rs"}}"#)
    }

    #[test]
    fn tenth_call_trips_tool_call_limit() {
        let b = breaker(10, 0);
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();

        for n in 1..=9 {
            let args = call(n);
            let r = b.before(&mut session, ToolCall::new("read_file", &args), t0(), &retention);
            assert!(r.is_ok(), "call {n} should pass: {r:?}");
            assert!(!session.active_window().unwrap().hard_limit_hit);
        }

        let args = call(10);
        let err = b
            .before(&mut session, ToolCall::new("read_file", &args), t0(), &retention)
            .unwrap_err();
        assert!(matches!(
            err,
            GovernorError::BudgetExceeded(LimitBreach::ToolCalls { calls: 10, limit: 10 })
        ));
        assert!(session.active_window().unwrap().hard_limit_hit);
    }

    #[test]
    fn latch_rejects_without_mutation() {
        let b = breaker(2, 0);
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        let _ = b.before(&mut session, ToolCall::new("a", "{}"), t0(), &retention);
        let _ = b.before(&mut session, ToolCall::new("b", "{}"), t0(), &retention);
        let calls_at_trip = session.active_window().unwrap().tool_calls;

        for _ in 0..5 {
            b.after(&mut session, true, t0());
            let err = b
                .before(&mut session, ToolCall::new("c", "{}"), t0(), &retention)
                .unwrap_err();
            assert!(matches!(err, GovernorError::CircuitOpen { invocation: 1, .. }));
        }
        assert_eq!(session.active_window().unwrap().tool_calls, calls_at_trip);
    }

    #[test]
    fn identical_calls_trip_repetition_limit() {
        let b = breaker(1000, 10);
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        let args = r#"{"pattern":"TODO","path":"."}"#;

        for _ in 1..=9 {
            b.before(&mut session, ToolCall::new("grep", args), t0(), &retention)
                .unwrap();
        }
        let err = b
            .before(&mut session, ToolCall::new("grep", args), t0(), &retention)
            .unwrap_err();
        match err {
            GovernorError::BudgetExceeded(LimitBreach::Repetition { tool, count, limit }) => {
                assert_eq!(tool, "grep");
                assert_eq!(count, 10);
                assert_eq!(limit, 10);
            }
            other => panic!("expected repetition breach, got {other:?}"),
        }
    }

    #[test]
    fn interleaved_call_resets_repetition_run() {
        let b = breaker(1000, 3);
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        for _ in 0..2 {
            b.before(&mut session, ToolCall::new("grep", "{}"), t0(), &retention)
                .unwrap();
        }
        b.before(&mut session, ToolCall::new("ls", "{}"), t0(), &retention)
            .unwrap();
        for _ in 0..2 {
            b.before(&mut session, ToolCall::new("grep", "{}"), t0(), &retention)
                .unwrap();
        }
    }

    #[test]
    fn consecutive_errors_trip_on_next_call() {
        let b = breaker(1000, 0);
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        for n in 0..5 {
            let args = call(n);
            b.before(&mut session, ToolCall::new("shell", &args), t0(), &retention)
                .unwrap();
            b.after(&mut session, false, t0());
        }
        let err = b
            .before(&mut session, ToolCall::new("shell", "{}"), t0(), &retention)
            .unwrap_err();
        assert!(matches!(
            err,
            GovernorError::BudgetExceeded(LimitBreach::ConsecutiveErrors { count: 5, limit: 5 })
        ));
    }

    #[test]
    fn success_resets_error_streak() {
        let b = breaker(1000, 0);
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        for n in 0..4 {
            let args = call(n);
            b.before(&mut session, ToolCall::new("shell", &args), t0(), &retention)
                .unwrap();
            b.after(&mut session, false, t0());
        }
        b.after(&mut session, true, t0());
        assert_eq!(session.active_window().unwrap().consecutive_errors, 0);
    }

    #[test]
    fn duration_is_evaluated_lazily() {
        let b = CircuitBreaker::new(CircuitBreakerConfig {
            max_duration_minutes: 30,
            idle_timeout_minutes: 0,
            ..Default::default()
        });
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        let much_later = t0() + Duration::hours(5);
        // Nothing happens until the next call.
        assert!(!session.active_window().unwrap().hard_limit_hit);
        let err = b
            .before(&mut session, ToolCall::new("grep", "{}"), much_later, &retention)
            .unwrap_err();
        assert!(matches!(
            err,
            GovernorError::BudgetExceeded(LimitBreach::Duration { limit: 30, .. })
        ));
    }

    #[test]
    fn warning_is_issued_once() {
        let b = CircuitBreaker::new(CircuitBreakerConfig {
            max_tool_calls: 10,
            warning_threshold: 0.5,
            max_duration_minutes: 600,
            idle_timeout_minutes: 600,
            ..Default::default()
        });
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        let mut warnings = Vec::new();
        for n in 1..=8 {
            let args = call(n);
            match b
                .before(&mut session, ToolCall::new("read_file", &args), t0(), &retention)
                .unwrap()
            {
                Admission::Admitted { warning: Some(w) } => warnings.push((n, w)),
                Admission::Admitted { warning: None } => {}
                Admission::Unlimited => panic!("coder should be tracked"),
            }
        }
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].0, 5);
        assert!(warnings[0].1.contains("tool calls 5/10"));
        let w = session.active_window().unwrap();
        assert!(w.warning_issued);
        assert_eq!(w.warning_reason.as_deref(), Some(warnings[0].1.as_str()));
    }

    #[test]
    fn root_is_unlimited() {
        let b = breaker(1, 1);
        let root = worker("");
        let mut session = Session::new("s", root, t0());
        let retention = RetentionConfig::default();
        for _ in 0..10 {
            assert_eq!(
                b.before(&mut session, ToolCall::new("task", "{}"), t0(), &retention)
                    .unwrap(),
                Admission::Unlimited
            );
        }
        assert_eq!(session.window_count(), 0);
    }

    #[test]
    fn unthrottled_profile_skips_tracking() {
        let b = CircuitBreaker::new(CircuitBreakerConfig::default().with_profile(
            "planner",
            ProfileOverride {
                max_tool_calls: Some(0),
                max_duration_minutes: Some(0),
                ..Default::default()
            },
        ));
        let mut session = delegated("planner");
        let retention = RetentionConfig::default();
        for _ in 0..50 {
            assert_eq!(
                b.before(&mut session, ToolCall::new("grep", "{}"), t0(), &retention)
                    .unwrap(),
                Admission::Unlimited
            );
        }
        assert_eq!(session.active_window().unwrap().tool_calls, 0);
    }

    #[test]
    fn missing_window_is_opened_lazily() {
        let b = breaker(10, 0);
        let w = worker("coder");
        let mut session = Session::new("s", w, t0());
        let retention = RetentionConfig::default();
        b.before(&mut session, ToolCall::new("grep", "{}"), t0(), &retention)
            .unwrap();
        let window = session.active_window().unwrap();
        assert_eq!(window.id, 1);
        assert_eq!(window.tool_calls, 1);
        assert!(session.delegation_active);
    }

    #[test]
    fn disabled_breaker_admits_everything() {
        let b = CircuitBreaker::new(CircuitBreakerConfig::disabled());
        let mut session = delegated("coder");
        let retention = RetentionConfig::default();
        for _ in 0..500 {
            assert_eq!(
                b.before(&mut session, ToolCall::new("grep", "{}"), t0(), &retention)
                    .unwrap(),
                Admission::Unlimited
            );
        }
    }
}
