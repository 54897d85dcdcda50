//! Invocation windows: per-(worker, invocation) consumption counters.
//!
//! A [`Window`] is opened every time a non-root worker is delegated to and
//! accumulates what that one delegation has consumed. Windows are never
//! reset in place; re-delegating a worker opens a fresh window with a new
//! id, which is how a worker that tripped a hard limit gets a clean slate.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;

/// Capacity of the recent tool call ring used for repetition detection.
pub const RECENT_CALLS_CAPACITY: usize = 20;

/// Key of a window inside a session: base worker name plus invocation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey {
    pub base_name: String,
    pub invocation_id: u64,
}

impl WindowKey {
    pub fn new(base_name: impl Into<String>, invocation_id: u64) -> Self {
        Self {
            base_name: base_name.into(),
            invocation_id,
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base_name, self.invocation_id)
    }
}

/// One entry of the recent tool call ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentCall {
    pub tool: String,
    /// Approximate argument fingerprint, see [`crate::breaker::fingerprint`].
    pub fingerprint: u64,
    pub at: DateTime<Utc>,
}

/// Consumption counters for one worker invocation.
#[derive(Debug, Clone)]
pub struct Window {
    /// Per-base-name monotonic invocation counter.
    pub id: u64,
    /// Raw worker name as reported at delegation time.
    pub worker: String,
    pub started_at: DateTime<Utc>,
    /// Session-wide open order; breaks `started_at` ties when pruning.
    pub sequence: u64,
    pub tool_calls: u32,
    pub consecutive_errors: u32,
    /// Latches: once set, only a new invocation clears it.
    pub hard_limit_hit: bool,
    pub last_success_time: DateTime<Utc>,
    recent_tool_calls: VecDeque<RecentCall>,
    pub warning_issued: bool,
    pub warning_reason: Option<String>,
}

impl Window {
    /// Open a zeroed window.
    pub fn new(id: u64, worker: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            worker: worker.into(),
            started_at,
            sequence: 0,
            tool_calls: 0,
            consecutive_errors: 0,
            hard_limit_hit: false,
            last_success_time: started_at,
            recent_tool_calls: VecDeque::with_capacity(RECENT_CALLS_CAPACITY),
            warning_issued: false,
            warning_reason: None,
        }
    }

    /// Push a call onto the ring, evicting the oldest entry beyond capacity.
    pub fn record_call(&mut self, tool: impl Into<String>, fingerprint: u64, at: DateTime<Utc>) {
        if self.recent_tool_calls.len() >= RECENT_CALLS_CAPACITY {
            self.recent_tool_calls.pop_front();
        }
        self.recent_tool_calls.push_back(RecentCall {
            tool: tool.into(),
            fingerprint,
            at,
        });
    }

    pub fn recent_calls(&self) -> impl Iterator<Item = &RecentCall> {
        self.recent_tool_calls.iter()
    }

    /// Length of the run of identical `(tool, fingerprint)` entries ending
    /// at the most recent call. Zero when the ring is empty.
    pub fn repetition_count(&self) -> u32 {
        let mut calls = self.recent_tool_calls.iter().rev();
        let Some(last) = calls.next() else {
            return 0;
        };
        1 + calls
            .take_while(|c| c.tool == last.tool && c.fingerprint == last.fingerprint)
            .count() as u32
    }

    /// Minutes since the window opened.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.started_at, now)
    }

    /// Minutes since the last successful tool result (or since opening).
    pub fn idle_minutes(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.last_success_time, now)
    }

    /// Record the outcome of a tool call.
    pub fn record_result(&mut self, succeeded: bool, now: DateTime<Utc>) {
        if succeeded {
            self.consecutive_errors = 0;
            self.last_success_time = now;
        } else {
            self.consecutive_errors += 1;
        }
    }

    /// Immutable summary for logs and the replay tool.
    pub fn snapshot(&self, now: DateTime<Utc>) -> WindowSnapshot {
        WindowSnapshot {
            worker: self.worker.clone(),
            invocation_id: self.id,
            tool_calls: self.tool_calls,
            consecutive_errors: self.consecutive_errors,
            repetitions: self.repetition_count(),
            elapsed_minutes: self.elapsed_minutes(now),
            hard_limit_hit: self.hard_limit_hit,
            warning_reason: self.warning_reason.clone(),
        }
    }
}

/// Point-in-time view of a window's consumption.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub worker: String,
    pub invocation_id: u64,
    pub tool_calls: u32,
    pub consecutive_errors: u32,
    pub repetitions: u32,
    pub elapsed_minutes: f64,
    pub hard_limit_hit: bool,
    pub warning_reason: Option<String>,
}

impl WindowSnapshot {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        let state = if self.hard_limit_hit {
            "open"
        } else if self.warning_reason.is_some() {
            "warned"
        } else {
            "ok"
        };
        format!(
            "{}#{}: {} calls, {} errors, {}x repeat, {:.1} min [{state}]",
            self.worker,
            self.invocation_id,
            self.tool_calls,
            self.consecutive_errors,
            self.repetitions,
            self.elapsed_minutes,
        )
    }
}

/// Fractional minutes between two instants, clamped at zero.
pub(crate) fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 60_000.0).max(0.0)
}
