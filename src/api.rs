//! Transport seams
//!
//! The engine never talks to the network directly. A host wires in a
//! `TaskApi` for request/response fetches and a `PushConnector` for the
//! real-time delta stream; tests wire in in-memory fakes. Both return *raw*
//! payload shapes — normalization happens engine-side so every transport
//! gets the same boundary behavior.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::normalize::{RawAssignment, RawBrand, RawCompany, RawTask, RawTaskType, RawUser};
use crate::sync::events::PushEvent;
use crate::types::ConnectionIdentity;

/// Request/response surface of the remote authority.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn fetch_tasks(&self) -> Result<Vec<RawTask>>;
    async fn fetch_users(&self) -> Result<Vec<RawUser>>;
    async fn fetch_brands(&self) -> Result<Vec<RawBrand>>;
    async fn fetch_companies(&self) -> Result<Vec<RawCompany>>;
    async fn fetch_task_types(&self) -> Result<Vec<RawTaskType>>;
    /// Assignment mapping for one (company, user) pair.
    async fn fetch_assignments(&self, company_name: &str, user_id: &str)
        -> Result<RawAssignment>;
}

/// Push surface: subscribe once per session with the actor's identity and
/// receive typed deltas until the sender side drops.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, identity: ConnectionIdentity) -> Result<mpsc::Receiver<PushEvent>>;
}
