//! Error types for sync engine operations
//!
//! Errors are classified by recoverability:
//! - Transient: transport failures, channel drops — retry on the next eligible call
//! - NonTransient: malformed payloads, missing session, local persistence faults
//!
//! Permission outcomes are *decisions*, not errors — see `policy::permissions`.

use thiserror::Error;

/// Error type for engine operations
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    // Transient errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    // Non-transient errors
    #[error("No active session")]
    NoSession,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl EngineError {
    /// Returns true if a retry on the next eligible call can plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transport(_) | EngineError::ChannelClosed(_))
    }

    /// Short stable label for logs and status surfaces
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Transport(_) => "transport",
            EngineError::ChannelClosed(_) => "channel",
            EngineError::NoSession => "no_session",
            EngineError::Persistence(_) => "persistence",
            EngineError::InvalidPayload(_) => "invalid_payload",
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidPayload(err.to_string())
    }
}

/// Serializable error representation for UI-adjacent callers
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFault {
    pub message: String,
    pub kind: String,
    pub can_retry: bool,
}

impl From<&EngineError> for SyncFault {
    fn from(err: &EngineError) -> Self {
        SyncFault {
            message: err.to_string(),
            kind: err.kind().to_string(),
            can_retry: err.is_transient(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
