//! Structured worker identities.
//!
//! Multi-swarm deployments prefix worker names with a namespace
//! (`alpha_coder`, `beta_coder`). Budgets, overrides, and invocation
//! counters are all keyed by the *base* name (`coder`), so the raw string
//! is parsed exactly once at the hook boundary by [`WorkerNaming`] and
//! everything inside the crate works with [`WorkerIdentity`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default identity of the orchestrator. It owns no window and has no budget.
pub const DEFAULT_ROOT_WORKER: &str = "orchestrator";

/// Rules for turning raw worker names into [`WorkerIdentity`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkerNaming {
    /// Base name of the root/orchestrator identity.
    pub root_worker: String,
    /// Separator between namespace and base name. Default: `_`.
    pub separator: String,
    /// Known base names. When non-empty, a raw name is matched against
    /// these suffixes first (longest wins), so base names that themselves
    /// contain the separator (`code_reviewer`) are not split.
    pub known_roles: Vec<String>,
}

impl Default for WorkerNaming {
    fn default() -> Self {
        Self {
            root_worker: DEFAULT_ROOT_WORKER.to_string(),
            separator: "_".to_string(),
            known_roles: Vec::new(),
        }
    }
}

impl WorkerNaming {
    /// Parse a raw worker name. An empty (or whitespace) name is the root.
    pub fn identify(&self, raw: &str) -> WorkerIdentity {
        let raw = raw.trim();
        if raw.is_empty() {
            return WorkerIdentity::root(&self.root_worker);
        }

        let (namespace, base) = self
            .match_known_role(raw)
            .or_else(|| self.split_first(raw))
            .unwrap_or((None, raw));

        WorkerIdentity {
            raw: raw.to_string(),
            namespace: namespace.map(str::to_string),
            base_name: base.to_string(),
            root: base == self.root_worker,
        }
    }

    fn match_known_role<'a>(&self, raw: &'a str) -> Option<(Option<&'a str>, &'a str)> {
        let mut roles: Vec<&str> = self
            .known_roles
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.root_worker.as_str()))
            .filter(|r| !r.is_empty())
            .collect();
        roles.sort_by_key(|r| std::cmp::Reverse(r.len()));

        for role in roles {
            if raw == role {
                return Some((None, raw));
            }
            if let Some(prefix) = raw.strip_suffix(role)
                && let Some(namespace) = prefix.strip_suffix(self.separator.as_str())
                && !namespace.is_empty()
            {
                let base_start = prefix.len();
                return raw.get(base_start..).map(|base| (Some(namespace), base));
            }
        }
        None
    }

    fn split_first<'a>(&self, raw: &'a str) -> Option<(Option<&'a str>, &'a str)> {
        if self.separator.is_empty() {
            return None;
        }
        match raw.split_once(self.separator.as_str()) {
            Some((ns, base)) if !ns.is_empty() && !base.is_empty() => Some((Some(ns), base)),
            _ => None,
        }
    }
}

/// A parsed worker identity: optional namespace plus base name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity {
    raw: String,
    namespace: Option<String>,
    base_name: String,
    root: bool,
}

impl WorkerIdentity {
    /// The root/orchestrator identity.
    pub fn root(root_worker: &str) -> Self {
        Self {
            raw: root_worker.to_string(),
            namespace: None,
            base_name: root_worker.to_string(),
            root: true,
        }
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Worker name with any namespace prefix removed.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The name exactly as the host reported it.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
