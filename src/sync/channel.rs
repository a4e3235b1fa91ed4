//! Push channel lifecycle.
//!
//! One channel per session: `Disconnected → Connecting → Connected`, back to
//! `Disconnected` when the stream ends or the actor changes. The channel owns
//! a pump task that drains the connector's receiver and hands each event to
//! the session's handler; it never interprets events itself. A drop of the
//! stream discards no task data — the store keeps serving the last snapshot
//! while `ensure_connected` brings the channel back.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::PushConnector;
use crate::error::Result;
use crate::types::ConnectionIdentity;

use super::events::PushEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct SyncChannel {
    state: Arc<Mutex<ChannelState>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Default for SyncChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncChannel {
    pub fn new() -> Self {
        SyncChannel {
            state: Arc::new(Mutex::new(ChannelState::Disconnected)),
            pump: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Subscribe with the given identity and start pumping events into
    /// `on_event`. Replaces any previous pump. `on_state` observes every
    /// lifecycle transition, including the disconnect when the stream ends.
    pub async fn connect<E, S>(
        &self,
        connector: Arc<dyn PushConnector>,
        identity: ConnectionIdentity,
        on_event: E,
        on_state: S,
    ) -> Result<()>
    where
        E: Fn(PushEvent) + Send + 'static,
        S: Fn(ChannelState) + Send + 'static,
    {
        self.disconnect();
        *self.state.lock() = ChannelState::Connecting;
        on_state(ChannelState::Connecting);

        let receiver = match connector.connect(identity.clone()).await {
            Ok(receiver) => receiver,
            Err(err) => {
                log::warn!("Channel: connect failed for {}: {}", identity.user_id, err);
                *self.state.lock() = ChannelState::Disconnected;
                on_state(ChannelState::Disconnected);
                return Err(err);
            }
        };

        *self.state.lock() = ChannelState::Connected;
        on_state(ChannelState::Connected);
        log::info!(
            "Channel: connected as {} ({})",
            identity.user_id,
            identity.role.as_str()
        );

        let state = self.state.clone();
        *self.pump.lock() = Some(tokio::spawn(pump(receiver, state, on_event, on_state)));
        Ok(())
    }

    /// Abort the pump and mark disconnected. Idempotent; used on actor switch
    /// and logout. Silent toward `on_state`: the caller decides what a
    /// teardown means.
    pub fn disconnect(&self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
            log::debug!("Channel: pump task aborted");
        }
        *self.state.lock() = ChannelState::Disconnected;
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}

async fn pump<E, S>(
    mut receiver: mpsc::Receiver<PushEvent>,
    state: Arc<Mutex<ChannelState>>,
    on_event: E,
    on_state: S,
) where
    E: Fn(PushEvent),
    S: Fn(ChannelState),
{
    while let Some(event) = receiver.recv().await {
        log::debug!("Channel: {} received", event.kind());
        on_event(event);
    }
    // Stream end means the connector dropped us; data stays, state flips.
    log::info!("Channel: stream ended, marking disconnected");
    *state.lock() = ChannelState::Disconnected;
    on_state(ChannelState::Disconnected);
}
