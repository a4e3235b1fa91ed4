//! Synchronization plumbing: the push channel, the refresh gate, and the
//! event vocabulary shared by both. The session layer composes these; nothing
//! here touches the store or caches directly.

pub mod channel;
pub mod events;
pub mod refresh;

pub use channel::{ChannelState, SyncChannel};
pub use events::{LocalEvent, PushEvent, ReferenceScope};
pub use refresh::{RefreshGate, RefreshStatus};
