//! Session registry: session id → [`Session`] with nested invocation windows.
//!
//! The registry is the only shared mutable state in the crate. It is an
//! explicitly constructed object owned by the [`Governor`](crate::Governor),
//! never a global. The outer map lock is held just long enough to find or
//! insert a session; all per-session work happens under that session's own
//! mutex, so distinct sessions never contend with each other.

use super::identity::WorkerIdentity;
use super::window::{Window, WindowKey};
use crate::error::{GovernorError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<Session>>;

// ── Retention ──────────────────────────────────────────────────────

/// Bounded retention for invocation windows.
///
/// Pruning runs after every new invocation. It is hygiene, not a
/// correctness mechanism: nothing stops it from dropping the active window
/// if a single delegation outlives `max_window_age_hours`, which is why the
/// defaults are far above normal session length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetentionConfig {
    /// Windows started longer ago than this are dropped. Default: 24.
    pub max_window_age_hours: u32,
    /// At most this many windows are kept per session, most recent first.
    /// Default: 50.
    pub max_windows: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_window_age_hours: 24,
            max_windows: 50,
        }
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::hours(i64::from(self.max_window_age_hours))
    }
}

// ── Session ────────────────────────────────────────────────────────

/// State for one external session id.
#[derive(Debug)]
pub struct Session {
    id: String,
    active_worker: WorkerIdentity,
    pub last_tool_call_time: Option<DateTime<Utc>>,
    pub last_worker_event_time: DateTime<Utc>,
    /// True while control is believed to be inside a non-root worker.
    pub delegation_active: bool,
    last_invocation_id_by_worker: HashMap<String, u64>,
    active_invocation_id: Option<u64>,
    windows_opened: u64,
    windows: HashMap<WindowKey, Window>,
}

impl Session {
    pub fn new(id: impl Into<String>, worker: WorkerIdentity, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            active_worker: worker,
            last_tool_call_time: None,
            last_worker_event_time: now,
            delegation_active: false,
            last_invocation_id_by_worker: HashMap::new(),
            active_invocation_id: None,
            windows_opened: 0,
            windows: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn active_worker(&self) -> &WorkerIdentity {
        &self.active_worker
    }

    /// Record `worker` as the active identity. Returns `true` when this
    /// crossed a delegation boundary (the identity changed), in which case
    /// the active invocation is cleared and `delegation_active` reset.
    pub fn set_active_worker(&mut self, worker: &WorkerIdentity, now: DateTime<Utc>) -> bool {
        if &self.active_worker == worker {
            return false;
        }
        debug!(
            session = %self.id,
            from = %self.active_worker,
            to = %worker,
            "delegation boundary"
        );
        self.active_worker = worker.clone();
        self.delegation_active = false;
        self.active_invocation_id = None;
        self.last_worker_event_time = now;
        true
    }

    /// Open a fresh window for `worker` and make it active.
    ///
    /// Returns `None` for the root identity. Windows never inherit counters
    /// from earlier invocations of the same worker.
    pub fn begin_invocation(
        &mut self,
        worker: &WorkerIdentity,
        now: DateTime<Utc>,
        retention: &RetentionConfig,
    ) -> Option<&Window> {
        if worker.is_root() {
            return None;
        }

        let counter = self
            .last_invocation_id_by_worker
            .entry(worker.base_name().to_string())
            .or_insert(0);
        *counter += 1;
        let id = *counter;

        self.windows_opened += 1;
        let mut window = Window::new(id, worker.raw(), now);
        window.sequence = self.windows_opened;

        let key = WindowKey::new(worker.base_name(), id);
        self.windows.insert(key.clone(), window);
        self.active_worker = worker.clone();
        self.active_invocation_id = Some(id);
        self.last_worker_event_time = now;
        debug!(session = %self.id, window = %key, "invocation started");

        self.prune_windows(now, retention.max_age(), retention.max_windows);
        self.windows.get(&key)
    }

    /// Last invocation id handed out for a base name.
    pub fn last_invocation_id(&self, base_name: &str) -> Option<u64> {
        self.last_invocation_id_by_worker.get(base_name).copied()
    }

    pub fn active_invocation_id(&self) -> Option<u64> {
        self.active_invocation_id
    }

    fn active_key(&self) -> Option<WindowKey> {
        if self.active_worker.is_root() {
            return None;
        }
        self.active_invocation_id
            .map(|id| WindowKey::new(self.active_worker.base_name(), id))
    }

    pub fn active_window(&self) -> Option<&Window> {
        self.active_key().and_then(|k| self.windows.get(&k))
    }

    pub fn active_window_mut(&mut self) -> Option<&mut Window> {
        let key = self.active_key()?;
        self.windows.get_mut(&key)
    }

    pub fn window(&self, key: &WindowKey) -> Option<&Window> {
        self.windows.get(key)
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows older than `max_age`, then keep only the `max_count`
    /// most recently started. Returns the number removed.
    pub fn prune_windows(&mut self, now: DateTime<Utc>, max_age: Duration, max_count: usize) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| now - w.started_at <= max_age);

        if self.windows.len() > max_count {
            let mut by_recency: Vec<(DateTime<Utc>, u64, WindowKey)> = self
                .windows
                .iter()
                .map(|(k, w)| (w.started_at, w.sequence, k.clone()))
                .collect();
            by_recency.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
            for (_, _, key) in by_recency.into_iter().skip(max_count) {
                self.windows.remove(&key);
            }
        }

        let removed = before - self.windows.len();
        if removed > 0 {
            debug!(session = %self.id, removed, remaining = self.windows.len(), "pruned windows");
        }
        removed
    }
}

// ── SessionRegistry ────────────────────────────────────────────────

/// Map of session id → session state with per-key isolation.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    retention: RetentionConfig,
}

impl SessionRegistry {
    pub fn new(retention: RetentionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> &RetentionConfig {
        &self.retention
    }

    /// Return the session, creating it on first reference. If `worker`
    /// differs from the recorded identity, the session crosses a delegation
    /// boundary (see [`Session::set_active_worker`]).
    pub fn ensure_session(
        &self,
        session_id: &str,
        worker: &WorkerIdentity,
        now: DateTime<Utc>,
    ) -> SessionHandle {
        let handle = {
            let mut sessions = lock(&self.sessions);
            Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
                debug!(session = session_id, worker = %worker, "session created");
                Arc::new(Mutex::new(Session::new(session_id, worker.clone(), now)))
            }))
        };
        lock(&handle).set_active_worker(worker, now);
        handle
    }

    /// Look up an existing session.
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        lock(&self.sessions).get(session_id).cloned()
    }

    /// Look up a session that must already exist.
    pub fn require(&self, session_id: &str) -> Result<SessionHandle> {
        self.get(session_id)
            .ok_or_else(|| GovernorError::UnknownSession(session_id.to_string()))
    }

    /// Open a new invocation window for `worker` in `session_id`, creating
    /// the session if needed. Returns a copy of the new window, or `None`
    /// for the root identity.
    pub fn begin_invocation(
        &self,
        session_id: &str,
        worker: &WorkerIdentity,
        now: DateTime<Utc>,
    ) -> Option<Window> {
        let handle = self.ensure_session(session_id, worker, now);
        let mut session = lock(&handle);
        session
            .begin_invocation(worker, now, &self.retention)
            .cloned()
    }

    /// Copy of the session's active window, if any.
    pub fn get_active_window(&self, session_id: &str) -> Option<Window> {
        let handle = self.get(session_id)?;
        let session = lock(&handle);
        session.active_window().cloned()
    }

    /// Prune a session's windows with explicit thresholds.
    pub fn prune_windows(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        max_age: Duration,
        max_count: usize,
    ) -> Result<usize> {
        let handle = self.require(session_id)?;
        let removed = lock(&handle).prune_windows(now, max_age, max_count);
        Ok(removed)
    }

    /// Forget a session entirely. Returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        lock(&self.sessions).remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
/// Session state stays usable: every mutation is a plain field update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::identity::WorkerNaming;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn id(name: &str) -> WorkerIdentity {
        WorkerNaming::default().identify(name)
    }

    fn roomy() -> SessionRegistry {
        SessionRegistry::new(RetentionConfig {
            max_window_age_hours: 10_000,
            max_windows: 10_000,
        })
    }

    #[test]
    fn root_never_gets_a_window() {
        let reg = SessionRegistry::default();
        assert!(reg.begin_invocation("s", &id(""), now()).is_none());
        assert!(reg.begin_invocation("s", &id("orchestrator"), now()).is_none());
        assert!(reg.get_active_window("s").is_none());
        let handle = reg.require("s").unwrap();
        assert_eq!(lock(&handle).window_count(), 0);
    }

    #[test]
    fn invocation_ids_are_per_base_name() {
        let reg = roomy();
        let ids: Vec<u64> = (0..3)
            .map(|_| reg.begin_invocation("s", &id("coder"), now()).unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert_eq!(reg.begin_invocation("s", &id("tester"), now()).unwrap().id, 1);
        assert_eq!(reg.begin_invocation("s", &id("coder"), now()).unwrap().id, 4);
    }

    #[test]
    fn namespaced_workers_share_the_base_counter() {
        let reg = roomy();
        assert_eq!(reg.begin_invocation("s", &id("alpha_coder"), now()).unwrap().id, 1);
        assert_eq!(reg.begin_invocation("s", &id("beta_coder"), now()).unwrap().id, 2);
    }

    #[test]
    fn fresh_invocation_does_not_inherit_latch() {
        let reg = roomy();
        reg.begin_invocation("s", &id("coder"), now());
        {
            let handle = reg.require("s").unwrap();
            let mut session = lock(&handle);
            let w = session.active_window_mut().unwrap();
            w.tool_calls = 42;
            w.consecutive_errors = 3;
            w.hard_limit_hit = true;
        }
        let fresh = reg.begin_invocation("s", &id("coder"), now()).unwrap();
        assert_eq!(fresh.id, 2);
        assert_eq!(fresh.tool_calls, 0);
        assert_eq!(fresh.consecutive_errors, 0);
        assert!(!fresh.hard_limit_hit);
    }

    #[test]
    fn identity_change_clears_active_window() {
        let reg = roomy();
        reg.begin_invocation("s", &id("coder"), now());
        assert!(reg.get_active_window("s").is_some());

        let handle = reg.ensure_session("s", &id("tester"), now());
        assert!(!lock(&handle).delegation_active);
        assert!(reg.get_active_window("s").is_none());
    }

    #[test]
    fn ensure_session_same_identity_is_stable() {
        let reg = roomy();
        reg.begin_invocation("s", &id("coder"), now());
        reg.ensure_session("s", &id("coder"), now());
        assert_eq!(reg.get_active_window("s").map(|w| w.id), Some(1));
    }

    #[test]
    fn prune_by_age() {
        let reg = roomy();
        let coder = id("coder");
        for hours in [30, 20, 1] {
            reg.begin_invocation("s", &coder, now() - Duration::hours(hours));
        }
        let removed = reg
            .prune_windows("s", now(), Duration::hours(24), 100)
            .unwrap();
        assert_eq!(removed, 1);

        let handle = reg.require("s").unwrap();
        let session = lock(&handle);
        assert_eq!(session.window_count(), 2);
        assert!(session.window(&WindowKey::new("coder", 1)).is_none());
        assert!(session.window(&WindowKey::new("coder", 2)).is_some());
        assert!(session.window(&WindowKey::new("coder", 3)).is_some());
    }

    #[test]
    fn automatic_prune_caps_window_count() {
        let reg = SessionRegistry::default();
        for _ in 0..60 {
            reg.begin_invocation("s", &id("coder"), now());
        }
        let handle = reg.require("s").unwrap();
        let session = lock(&handle);
        assert!(session.window_count() <= 50);
        // The newest invocation survives the cap.
        assert_eq!(session.active_window().map(|w| w.id), Some(60));
        assert!(session.window(&WindowKey::new("coder", 10)).is_none());
    }

    #[test]
    fn same_instant_prune_keeps_latest_opened_across_workers() {
        let reg = SessionRegistry::new(RetentionConfig {
            max_window_age_hours: 24,
            max_windows: 3,
        });
        for _ in 0..5 {
            reg.begin_invocation("s", &id("coder"), now());
        }
        let opened = reg.begin_invocation("s", &id("tester"), now());
        assert_eq!(opened.map(|w| w.id), Some(1));

        let handle = reg.require("s").unwrap();
        let session = lock(&handle);
        assert_eq!(session.window_count(), 3);
        assert_eq!(session.active_window().map(|w| w.worker.as_str()), Some("tester"));
        assert!(session.window(&WindowKey::new("coder", 5)).is_some());
        assert!(session.window(&WindowKey::new("coder", 4)).is_some());
        assert!(session.window(&WindowKey::new("coder", 3)).is_none());
    }

    #[test]
    fn unknown_session_is_an_error() {
        let reg = SessionRegistry::default();
        let err = reg
            .prune_windows("missing", now(), Duration::hours(1), 1)
            .unwrap_err();
        assert!(matches!(err, GovernorError::UnknownSession(ref s) if s == "missing"));
    }

    #[test]
    fn sessions_are_isolated() {
        let reg = roomy();
        reg.begin_invocation("a", &id("coder"), now());
        reg.begin_invocation("b", &id("coder"), now());
        reg.begin_invocation("b", &id("coder"), now());
        assert_eq!(reg.get_active_window("a").map(|w| w.id), Some(1));
        assert_eq!(reg.get_active_window("b").map(|w| w.id), Some(2));
        assert_eq!(reg.len(), 2);

        assert!(reg.remove("a"));
        assert!(!reg.remove("a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_sessions_do_not_interfere() {
        let reg = Arc::new(roomy());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let session = format!("s-{i}");
                    for _ in 0..25 {
                        reg.begin_invocation(&session, &id("coder"), now());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..8 {
            let w = reg.get_active_window(&format!("s-{i}")).unwrap();
            assert_eq!(w.id, 25);
        }
    }
}
