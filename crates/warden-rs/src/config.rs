//! Governor configuration.
//!
//! One JSON document with camelCase keys; every section and field is
//! optional and falls back to its default:
//!
//! ```json
//! {
//!   "naming": { "rootWorker": "orchestrator", "separator": "_" },
//!   "circuitBreaker": { "maxToolCalls": 200, "profiles": { "planner": { "maxToolCalls": 0, "maxDurationMinutes": 0 } } },
//!   "context": { "maxInjectionTokens": 600, "decisionDecay": { "mode": "exponential", "halfLifeHours": 24 } },
//!   "retention": { "maxWindowAgeHours": 24, "maxWindows": 50 }
//! }
//! ```
//!
//! Ranges are checked once by [`GovernorConfig::validate`], which both
//! loaders call. Hot paths trust the values.

use crate::breaker::CircuitBreakerConfig;
use crate::context::ContextScoringConfig;
use crate::error::{GovernorError, Result};
use crate::session::{RetentionConfig, WorkerNaming};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GovernorConfig {
    pub naming: WorkerNaming,
    pub circuit_breaker: CircuitBreakerConfig,
    pub context: ContextScoringConfig,
    pub retention: RetentionConfig,
}

impl GovernorConfig {
    /// Read, parse, and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| GovernorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.naming.root_worker.trim().is_empty() {
            return Err(GovernorError::invalid("naming.rootWorker", "must not be empty"));
        }
        if self.naming.separator.is_empty() {
            return Err(GovernorError::invalid("naming.separator", "must not be empty"));
        }
        if self.retention.max_windows == 0 {
            return Err(GovernorError::invalid(
                "retention.maxWindows",
                "must be at least 1",
            ));
        }
        self.circuit_breaker.validate()?;
        self.context.validate()
    }

    /// Pretty JSON with every default filled in.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(GovernorError::ConfigSerialize)
    }

    pub fn with_naming(mut self, naming: WorkerNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_context(mut self, context: ContextScoringConfig) -> Self {
        self.context = context;
        self
    }

    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }
}
