//! Replay recorded hook events through a [`Governor`].
//!
//! Input is JSON Lines, one event per line, tagged by `"event"`:
//!
//! ```text
//! {"event":"delegated","session":"s1","worker":"coder","at":"2025-05-06T08:00:00Z"}
//! {"event":"tool_before","session":"s1","worker":"coder","tool":"grep","arguments":{"pattern":"TODO"}}
//! {"event":"tool_after","session":"s1","tool":"grep","succeeded":true}
//! {"event":"messages","session":"s1","messages":[{"role":"user","content":"continue"}]}
//! ```
//!
//! Each event produces one [`ReplayOutcome`], written as one JSON line.
//! Events without `at` reuse the last timestamp seen, so a log can carry a
//! clock on only some lines. Malformed lines produce an `error` outcome and
//! the replay continues.

use crate::context::ContextSnapshot;
use crate::error::Result;
use crate::governor::{Governor, HookAction};
use crate::Message;
use crate::session::WindowSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};
use tracing::warn;

/// One recorded hook invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    Delegated {
        session: String,
        /// Empty or absent means control returned to the root.
        #[serde(default)]
        worker: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    ToolBefore {
        session: String,
        worker: String,
        tool: String,
        /// JSON arguments. A string is taken as the raw argument text.
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    ToolAfter {
        session: String,
        tool: String,
        succeeded: bool,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Messages {
        session: String,
        messages: Vec<Message>,
    },
    Context {
        session: String,
        snapshot: ContextSnapshot,
        #[serde(default)]
        messages: Vec<Message>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    End {
        session: String,
    },
}

impl ReplayEvent {
    fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReplayEvent::Delegated { at, .. }
            | ReplayEvent::ToolBefore { at, .. }
            | ReplayEvent::ToolAfter { at, .. }
            | ReplayEvent::Context { at, .. } => *at,
            ReplayEvent::Messages { .. } | ReplayEvent::End { .. } => None,
        }
    }
}

/// Result of replaying one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ReplayOutcome {
    Delegated {
        session: String,
        window: Option<WindowSnapshot>,
    },
    Proceed {
        session: String,
        tool: String,
        window: Option<WindowSnapshot>,
    },
    Blocked {
        session: String,
        tool: String,
        reason: String,
    },
    Recorded {
        session: String,
        tool: String,
    },
    Messages {
        session: String,
        changed: bool,
        messages: Vec<Message>,
    },
    Context {
        session: String,
        selected: usize,
        skipped: usize,
        used_tokens: usize,
        max_tokens: usize,
        messages: Vec<Message>,
    },
    Ended {
        session: String,
        existed: bool,
    },
    Error {
        line: usize,
        message: String,
    },
}

/// Counts over a finished replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStats {
    pub events: usize,
    pub blocked: usize,
    pub errors: usize,
}

/// Drives a [`Governor`] with recorded events and a replay clock.
#[derive(Debug)]
pub struct Replayer {
    governor: Governor,
    clock: DateTime<Utc>,
}

impl Replayer {
    /// `start` is the clock for events before the first timestamped one.
    pub fn new(governor: Governor, start: DateTime<Utc>) -> Self {
        Self {
            governor,
            clock: start,
        }
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Apply one event. `line` is used only for error outcomes.
    pub fn apply(&mut self, event: ReplayEvent, line: usize) -> ReplayOutcome {
        if let Some(at) = event.at() {
            self.clock = at;
        }
        let now = self.clock;
        let g = &self.governor;

        match event {
            ReplayEvent::Delegated { session, worker, .. } => {
                g.worker_delegated_at(&session, &worker, now);
                let window = g.window_snapshot_at(&session, now);
                ReplayOutcome::Delegated { session, window }
            }
            ReplayEvent::ToolBefore {
                session,
                worker,
                tool,
                arguments,
                ..
            } => {
                let raw = match arguments {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                match g.tool_before_at(&session, &worker, &tool, &raw, now) {
                    Ok(HookAction::Proceed) => {
                        let window = g.window_snapshot_at(&session, now);
                        ReplayOutcome::Proceed {
                            session,
                            tool,
                            window,
                        }
                    }
                    Ok(HookAction::Block(reason)) => ReplayOutcome::Blocked {
                        session,
                        tool,
                        reason,
                    },
                    Err(e) => error_outcome(line, e),
                }
            }
            ReplayEvent::ToolAfter {
                session,
                tool,
                succeeded,
                ..
            } => match g.tool_after_at(&session, &tool, succeeded, now) {
                Ok(()) => ReplayOutcome::Recorded { session, tool },
                Err(e) => error_outcome(line, e),
            },
            ReplayEvent::Messages {
                session,
                mut messages,
            } => {
                let changed = g.messages_assembled_at(&session, &mut messages);
                ReplayOutcome::Messages {
                    session,
                    changed,
                    messages,
                }
            }
            ReplayEvent::Context {
                session,
                snapshot,
                mut messages,
                ..
            } => {
                let injection = g.inject_context_at(&session, &snapshot, &mut messages, now);
                ReplayOutcome::Context {
                    session,
                    selected: injection.entries.len(),
                    skipped: injection.skipped,
                    used_tokens: injection.used_tokens,
                    max_tokens: injection.max_tokens,
                    messages,
                }
            }
            ReplayEvent::End { session } => {
                let existed = g.end_session(&session);
                ReplayOutcome::Ended { session, existed }
            }
        }
    }

    /// Replay every line of `input`, writing one JSON outcome per event to
    /// `output`. Blank lines are ignored.
    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        for (i, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let number = i + 1;
            let outcome = match serde_json::from_str::<ReplayEvent>(&line) {
                Ok(event) => self.apply(event, number),
                Err(e) => {
                    warn!(line = number, "skipping malformed replay event: {e}");
                    ReplayOutcome::Error {
                        line: number,
                        message: e.to_string(),
                    }
                }
            };

            stats.events += 1;
            match outcome {
                ReplayOutcome::Blocked { .. } => stats.blocked += 1,
                ReplayOutcome::Error { .. } => stats.errors += 1,
                _ => {}
            }
            serde_json::to_writer(&mut output, &outcome).map_err(std::io::Error::from)?;
            writeln!(output)?;
        }
        output.flush()?;
        Ok(stats)
    }
}

fn error_outcome(line: usize, e: crate::GovernorError) -> ReplayOutcome {
    warn!(line, "replay event failed: {e}");
    ReplayOutcome::Error {
        line,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GovernorConfig;
    use crate::breaker::CircuitBreakerConfig;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 8, 0, 0).unwrap()
    }

    fn replayer(max_tool_calls: u32) -> Replayer {
        let config = GovernorConfig::default().with_circuit_breaker(CircuitBreakerConfig {
            max_tool_calls,
            ..Default::default()
        });
        Replayer::new(Governor::new(config), start())
    }

    fn run(replayer: &mut Replayer, input: &str) -> (ReplayStats, Vec<Value>) {
        let mut out = Vec::new();
        let stats = replayer.run(input.as_bytes(), &mut out).unwrap();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (stats, lines)
    }

    #[test]
    fn parses_tagged_events() {
        let event: ReplayEvent = serde_json::from_str(
            r#"{"event":"tool_before","session":"s","worker":"coder","tool":"grep","arguments":{"q":1}}"#,
        )
        .unwrap();
        assert!(matches!(event, ReplayEvent::ToolBefore { ref tool, .. } if tool == "grep"));

        let event: ReplayEvent = serde_json::from_str(r#"{"event":"delegated","session":"s"}"#).unwrap();
        assert!(matches!(event, ReplayEvent::Delegated { ref worker, .. } if worker.is_empty()));
    }

    #[test]
    fn replay_blocks_after_cap() {
        let input = r#"
{"event":"delegated","session":"s","worker":"coder"}
{"event":"tool_before","session":"s","worker":"coder","tool":"ls","arguments":{}}
{"event":"tool_after","session":"s","tool":"ls","succeeded":true}
{"event":"tool_before","session":"s","worker":"coder","tool":"cat","arguments":{"path":"a"}}
{"event":"messages","session":"s","messages":[{"role":"user","content":"go on"}]}
"#;
        let (stats, lines) = run(&mut replayer(2), input);
        assert_eq!(stats.events, 5);
        assert_eq!(stats.blocked, 1);
        assert_eq!(lines[0]["outcome"], "delegated");
        assert_eq!(lines[0]["window"]["invocationId"], 1);
        assert_eq!(lines[1]["outcome"], "proceed");
        assert_eq!(lines[2]["outcome"], "recorded");
        assert_eq!(lines[3]["outcome"], "blocked");
        assert_eq!(lines[4]["changed"], true);
        let content = lines[4]["messages"][0]["content"].as_str().unwrap();
        assert!(content.starts_with("[GUARDRAIL: CIRCUIT BREAKER OPEN]"));
    }

    #[test]
    fn malformed_and_failing_lines_become_errors() {
        let input = "not json\n{\"event\":\"tool_after\",\"session\":\"ghost\",\"tool\":\"ls\",\"succeeded\":false}\n";
        let (stats, lines) = run(&mut replayer(10), input);
        assert_eq!(stats.errors, 2);
        assert_eq!(lines[0]["outcome"], "error");
        assert_eq!(lines[0]["line"], 1);
        assert!(lines[1]["message"].as_str().unwrap().contains("ghost"));
    }

    #[test]
    fn timestamps_drive_lazy_duration_limit() {
        let input = r#"
{"event":"delegated","session":"s","worker":"coder","at":"2025-05-06T08:00:00Z"}
{"event":"tool_before","session":"s","worker":"coder","tool":"ls","arguments":{},"at":"2025-05-06T08:05:00Z"}
{"event":"tool_after","session":"s","tool":"ls","succeeded":true}
{"event":"tool_before","session":"s","worker":"coder","tool":"ls","arguments":{"x":1},"at":"2025-05-06T09:00:00Z"}
"#;
        let (stats, lines) = run(&mut replayer(200), input);
        assert_eq!(stats.blocked, 1);
        assert!(lines[3]["reason"].as_str().unwrap().contains("Time limit reached"));
    }

    #[test]
    fn end_event_releases_session() {
        let input = "{\"event\":\"delegated\",\"session\":\"s\",\"worker\":\"coder\"}\n{\"event\":\"end\",\"session\":\"s\"}\n{\"event\":\"end\",\"session\":\"s\"}\n";
        let mut r = replayer(10);
        let (_, lines) = run(&mut r, input);
        assert_eq!(lines[1]["existed"], true);
        assert_eq!(lines[2]["existed"], false);
        assert!(r.governor().registry().is_empty());
    }
}
