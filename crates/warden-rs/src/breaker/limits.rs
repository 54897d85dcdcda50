//! Budget dimensions: hard-limit evaluation and early warnings.

use super::profile::GuardrailProfile;
use crate::session::Window;
use chrono::{DateTime, Utc};

/// A budget dimension that was exceeded. The `Display` text is sent back
/// to the worker verbatim, so it names the dimension and both values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LimitBreach {
    #[error(
        "Tool call limit reached: {calls}/{limit} calls used in this invocation. \
         Stop calling tools and summarize your progress for the orchestrator."
    )]
    ToolCalls { calls: u32, limit: u32 },

    #[error(
        "Time limit reached: {elapsed_minutes:.1}/{limit} minutes elapsed in this invocation. \
         Stop calling tools and summarize your progress for the orchestrator."
    )]
    Duration { elapsed_minutes: f64, limit: u32 },

    #[error(
        "Repetition limit reached: '{tool}' was called {count} times in a row with the same \
         arguments (limit {limit}). You appear to be stuck in a loop; stop and summarize."
    )]
    Repetition { tool: String, count: u32, limit: u32 },

    #[error(
        "Error limit reached: {count} consecutive tool failures (limit {limit}). \
         Stop retrying and report what is failing."
    )]
    ConsecutiveErrors { count: u32, limit: u32 },

    #[error(
        "Idle limit reached: no successful tool result for {idle_minutes:.1} minutes \
         (limit {limit}). Stop calling tools and summarize your progress."
    )]
    Idle { idle_minutes: f64, limit: u32 },
}

impl LimitBreach {
    /// Short dimension name for logs.
    pub fn dimension(&self) -> &'static str {
        match self {
            LimitBreach::ToolCalls { .. } => "tool_calls",
            LimitBreach::Duration { .. } => "duration",
            LimitBreach::Repetition { .. } => "repetition",
            LimitBreach::ConsecutiveErrors { .. } => "consecutive_errors",
            LimitBreach::Idle { .. } => "idle",
        }
    }
}

/// Check every dimension in fixed order and return the first one exceeded.
///
/// `tool` is the call being admitted (already counted and pushed onto the
/// window's ring). Caps of `0` are skipped.
pub fn evaluate_limits(
    window: &Window,
    profile: &GuardrailProfile,
    tool: &str,
    now: DateTime<Utc>,
) -> Option<LimitBreach> {
    if profile.max_tool_calls > 0 && window.tool_calls >= profile.max_tool_calls {
        return Some(LimitBreach::ToolCalls {
            calls: window.tool_calls,
            limit: profile.max_tool_calls,
        });
    }

    let elapsed = window.elapsed_minutes(now);
    if profile.max_duration_minutes > 0 && elapsed >= f64::from(profile.max_duration_minutes) {
        return Some(LimitBreach::Duration {
            elapsed_minutes: elapsed,
            limit: profile.max_duration_minutes,
        });
    }

    let repetitions = window.repetition_count();
    if profile.max_repetitions > 0 && repetitions >= profile.max_repetitions {
        return Some(LimitBreach::Repetition {
            tool: tool.to_string(),
            count: repetitions,
            limit: profile.max_repetitions,
        });
    }

    if profile.max_consecutive_errors > 0
        && window.consecutive_errors >= profile.max_consecutive_errors
    {
        return Some(LimitBreach::ConsecutiveErrors {
            count: window.consecutive_errors,
            limit: profile.max_consecutive_errors,
        });
    }

    let idle = window.idle_minutes(now);
    if profile.idle_timeout_minutes > 0 && idle >= f64::from(profile.idle_timeout_minutes) {
        return Some(LimitBreach::Idle {
            idle_minutes: idle,
            limit: profile.idle_timeout_minutes,
        });
    }

    None
}

/// Every dimension at or above `profile.warning_threshold`, joined into one
/// human-readable reason. `None` when all are below.
pub fn warning_reason(
    window: &Window,
    profile: &GuardrailProfile,
    now: DateTime<Utc>,
) -> Option<String> {
    let dimensions = [
        (
            "tool calls",
            f64::from(window.tool_calls),
            profile.max_tool_calls,
        ),
        (
            "minutes elapsed",
            window.elapsed_minutes(now),
            profile.max_duration_minutes,
        ),
        (
            "identical calls in a row",
            f64::from(window.repetition_count()),
            profile.max_repetitions,
        ),
        (
            "consecutive errors",
            f64::from(window.consecutive_errors),
            profile.max_consecutive_errors,
        ),
        (
            "idle minutes",
            window.idle_minutes(now),
            profile.idle_timeout_minutes,
        ),
    ];

    let hot: Vec<String> = dimensions
        .iter()
        .filter(|(_, _, limit)| *limit > 0)
        .filter_map(|(label, current, limit)| {
            let fraction = current / f64::from(*limit);
            (fraction >= profile.warning_threshold).then(|| {
                format!(
                    "{label} {}/{limit} ({:.0}%)",
                    format_amount(*current),
                    fraction * 100.0
                )
            })
        })
        .collect();

    if hot.is_empty() {
        None
    } else {
        Some(hot.join(", "))
    }
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn profile() -> GuardrailProfile {
        GuardrailProfile {
            max_tool_calls: 10,
            max_duration_minutes: 30,
            max_repetitions: 4,
            max_consecutive_errors: 3,
            warning_threshold: 0.8,
            idle_timeout_minutes: 20,
        }
    }

    #[test]
    fn nothing_exceeded_on_fresh_window() {
        let w = Window::new(1, "coder", t0());
        assert!(evaluate_limits(&w, &profile(), "grep", t0()).is_none());
        assert!(warning_reason(&w, &profile(), t0()).is_none());
    }

    #[test]
    fn tool_calls_checked_first() {
        let mut w = Window::new(1, "coder", t0());
        w.tool_calls = 10;
        w.consecutive_errors = 3;
        let breach = evaluate_limits(&w, &profile(), "grep", t0() + Duration::hours(2)).unwrap();
        assert_eq!(breach, LimitBreach::ToolCalls { calls: 10, limit: 10 });
        assert!(breach.to_string().contains("10/10"));
    }

    #[test]
    fn duration_breach_reports_elapsed() {
        let w = Window::new(1, "coder", t0());
        let breach = evaluate_limits(&w, &profile(), "grep", t0() + Duration::minutes(31)).unwrap();
        assert_eq!(breach.dimension(), "duration");
        assert!(breach.to_string().contains("31.0/30 minutes"));
    }

    #[test]
    fn repetition_breach_names_tool() {
        let mut w = Window::new(1, "coder", t0());
        for _ in 0..4 {
            w.record_call("grep", 9, t0());
        }
        let breach = evaluate_limits(&w, &profile(), "grep", t0()).unwrap();
        assert!(matches!(breach, LimitBreach::Repetition { ref tool, count: 4, limit: 4 } if tool == "grep"));
    }

    #[test]
    fn error_streak_breach() {
        let mut w = Window::new(1, "coder", t0());
        w.consecutive_errors = 3;
        let breach = evaluate_limits(&w, &profile(), "grep", t0()).unwrap();
        assert_eq!(breach.dimension(), "consecutive_errors");
    }

    #[test]
    fn idle_measured_from_last_success() {
        let mut w = Window::new(1, "coder", t0());
        w.record_result(true, t0() + Duration::minutes(15));
        // 25 minutes elapsed overall but only 10 idle.
        assert!(evaluate_limits(&w, &profile(), "grep", t0() + Duration::minutes(25)).is_none());
        let breach = evaluate_limits(&w, &profile(), "grep", t0() + Duration::minutes(29));
        assert!(breach.is_none());

        let mut p = profile();
        p.max_duration_minutes = 0;
        let breach = evaluate_limits(&w, &p, "grep", t0() + Duration::minutes(40)).unwrap();
        assert_eq!(breach.dimension(), "idle");
    }

    #[test]
    fn zero_caps_are_unlimited() {
        let mut w = Window::new(1, "coder", t0());
        w.tool_calls = 10_000;
        w.consecutive_errors = 10_000;
        for _ in 0..20 {
            w.record_call("grep", 9, t0());
        }
        let unlimited = GuardrailProfile {
            max_tool_calls: 0,
            max_duration_minutes: 0,
            max_repetitions: 0,
            max_consecutive_errors: 0,
            warning_threshold: 0.5,
            idle_timeout_minutes: 0,
        };
        assert!(evaluate_limits(&w, &unlimited, "grep", t0() + Duration::days(3)).is_none());
        assert!(warning_reason(&w, &unlimited, t0() + Duration::days(3)).is_none());
    }

    #[test]
    fn warning_lists_every_hot_dimension() {
        let mut w = Window::new(1, "coder", t0());
        w.tool_calls = 8;
        w.record_call("grep", 1, t0());
        let reason = warning_reason(&w, &profile(), t0() + Duration::minutes(25)).unwrap();
        assert!(reason.contains("tool calls 8/10 (80%)"), "{reason}");
        assert!(reason.contains("minutes elapsed"), "{reason}");
        assert!(reason.contains("idle minutes 25/20"), "{reason}");
        assert!(!reason.contains("consecutive errors"), "{reason}");
    }
}
