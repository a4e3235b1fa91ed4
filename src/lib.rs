//! Role-scoped task synchronization engine.
//!
//! One [`SyncEngine`] owns the whole sync surface for a desktop client: it
//! pulls task and reference data through a [`TaskApi`], consumes real-time
//! deltas through a [`PushConnector`], resolves what the authenticated actor
//! may see and do (`policy`), and publishes [`LocalEvent`]s on a broadcast
//! bus whenever observable state changes.
//!
//! Layering, bottom up:
//!
//! - `types` / `util` — canonical records and key canonicalization
//! - `normalize` — the single parse boundary for loose authority payloads
//! - `store` / `refcache` — idempotent task store, TTL'd reference caches
//! - `policy` — role scoping, filters, permission decisions
//! - `sync` — push channel, refresh gate, event vocabulary
//! - `seen` — per-actor new-assignment detection
//! - `session` — the engine that wires it all to one login at a time

pub mod api;
pub mod config;
pub mod error;
pub mod normalize;
pub mod policy;
pub mod refcache;
pub mod seen;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
pub mod util;

#[cfg(test)]
mod testutil;

pub use api::{PushConnector, TaskApi};
pub use config::EngineConfig;
pub use error::{EngineError, Result, SyncFault};
pub use session::SyncEngine;
pub use sync::{ChannelState, LocalEvent, PushEvent, RefreshStatus};
pub use types::{Actor, Role, Task};
