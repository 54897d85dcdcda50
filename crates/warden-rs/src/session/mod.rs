//! Session and invocation-window state.
//!
//! - [`identity`]: [`WorkerIdentity`] and the [`WorkerNaming`] rules that
//!   strip multi-swarm namespace prefixes.
//! - [`window`]: [`Window`]: counters for one worker invocation, including
//!   the bounded ring of recent calls used for repetition detection.
//! - [`registry`]: [`SessionRegistry`] mapping session ids to [`Session`]s,
//!   with bounded window retention.

pub mod identity;
pub mod registry;
pub mod window;

pub use identity::{DEFAULT_ROOT_WORKER, WorkerIdentity, WorkerNaming};
pub use registry::{RetentionConfig, Session, SessionHandle, SessionRegistry};
pub use window::{RECENT_CALLS_CAPACITY, RecentCall, Window, WindowKey, WindowSnapshot};
