//! Circuit breaker configuration and per-worker guardrail profiles.
//!
//! [`CircuitBreakerConfig`] holds the global caps plus optional overrides
//! keyed by worker base name. [`CircuitBreakerConfig::resolve`] merges the
//! two into a [`GuardrailProfile`] for one worker. A cap of `0` means the
//! dimension is unlimited.

use crate::error::{GovernorError, Result};
use crate::session::WorkerIdentity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resolved budget caps for one worker identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailProfile {
    pub max_tool_calls: u32,
    pub max_duration_minutes: u32,
    pub max_repetitions: u32,
    pub max_consecutive_errors: u32,
    /// Fraction of any cap at which a one-time warning is issued.
    pub warning_threshold: f64,
    pub idle_timeout_minutes: u32,
}

impl GuardrailProfile {
    /// No call-count and no duration cap: the worker is not throttled at all.
    pub fn is_unthrottled(&self) -> bool {
        self.max_tool_calls == 0 && self.max_duration_minutes == 0
    }
}

/// Partial per-worker override. Unset fields inherit the global value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileOverride {
    pub max_tool_calls: Option<u32>,
    pub max_duration_minutes: Option<u32>,
    pub max_repetitions: Option<u32>,
    pub max_consecutive_errors: Option<u32>,
    pub warning_threshold: Option<f64>,
    pub idle_timeout_minutes: Option<u32>,
}

/// Circuit breaker settings.
///
/// # Example JSON
///
/// ```json
/// {
///   "maxToolCalls": 200,
///   "maxDurationMinutes": 30,
///   "profiles": {
///     "explorer": { "maxToolCalls": 400 },
///     "planner": { "maxToolCalls": 0, "maxDurationMinutes": 0 }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// When `false`, every tool call is admitted and nothing is tracked.
    pub enabled: bool,
    /// Default: 200.
    pub max_tool_calls: u32,
    /// Default: 30.
    pub max_duration_minutes: u32,
    /// Identical consecutive calls allowed. Default: 10.
    pub max_repetitions: u32,
    /// Default: 5.
    pub max_consecutive_errors: u32,
    /// Default: 0.75.
    pub warning_threshold: f64,
    /// Minutes without a successful tool result. Default: 15.
    pub idle_timeout_minutes: u32,
    /// Overrides keyed by worker base name.
    pub profiles: HashMap<String, ProfileOverride>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tool_calls: 200,
            max_duration_minutes: 30,
            max_repetitions: 10,
            max_consecutive_errors: 5,
            warning_threshold: 0.75,
            idle_timeout_minutes: 15,
            profiles: HashMap::new(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Add or replace the override for a worker base name.
    pub fn with_profile(mut self, base_name: impl Into<String>, profile: ProfileOverride) -> Self {
        self.profiles.insert(base_name.into(), profile);
        self
    }

    /// The global caps without any override applied.
    pub fn global_profile(&self) -> GuardrailProfile {
        GuardrailProfile {
            max_tool_calls: self.max_tool_calls,
            max_duration_minutes: self.max_duration_minutes,
            max_repetitions: self.max_repetitions,
            max_consecutive_errors: self.max_consecutive_errors,
            warning_threshold: self.warning_threshold,
            idle_timeout_minutes: self.idle_timeout_minutes,
        }
    }

    /// Merge the global caps with the override for `worker`'s base name.
    pub fn resolve(&self, worker: &WorkerIdentity) -> GuardrailProfile {
        let global = self.global_profile();
        let Some(o) = self.profiles.get(worker.base_name()) else {
            return global;
        };
        GuardrailProfile {
            max_tool_calls: o.max_tool_calls.unwrap_or(global.max_tool_calls),
            max_duration_minutes: o.max_duration_minutes.unwrap_or(global.max_duration_minutes),
            max_repetitions: o.max_repetitions.unwrap_or(global.max_repetitions),
            max_consecutive_errors: o
                .max_consecutive_errors
                .unwrap_or(global.max_consecutive_errors),
            warning_threshold: o.warning_threshold.unwrap_or(global.warning_threshold),
            idle_timeout_minutes: o.idle_timeout_minutes.unwrap_or(global.idle_timeout_minutes),
        }
    }

    /// Range checks, run once at load time.
    pub fn validate(&self) -> Result<()> {
        check_threshold("circuitBreaker.warningThreshold", self.warning_threshold)?;
        for (name, o) in &self.profiles {
            if name.trim().is_empty() {
                return Err(GovernorError::invalid(
                    "circuitBreaker.profiles",
                    "profile key must be a non-empty worker base name",
                ));
            }
            if let Some(t) = o.warning_threshold {
                check_threshold(&format!("circuitBreaker.profiles.{name}.warningThreshold"), t)?;
            }
        }
        Ok(())
    }
}

fn check_threshold(field: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(GovernorError::invalid(
            field,
            format!("must be strictly between 0 and 1, got {value}"),
        ))
    }
}
