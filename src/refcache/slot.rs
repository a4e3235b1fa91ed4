//! TTL + single-flight cache slot
//!
//! One slot guards one cached value. Reads within the TTL window return the
//! cached value without touching the network; concurrent misses collapse into
//! a single in-flight load that every caller awaits. A failed load leaves the
//! previous value and its timestamp untouched, so the slot degrades to
//! last-known-good instead of flapping.
//!
//! Uses `tokio::time::Instant` so tests drive expiry with a paused clock
//! instead of sleeping.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{EngineError, Result};
use crate::types::AssignmentMap;

/// Cacheable value. `is_vacant` marks values that must not satisfy a TTL hit
/// — an empty reference collection is indistinguishable from "never loaded
/// anything useful", so it stays eligible for refetch.
pub trait SlotValue: Clone + Send {
    fn is_vacant(&self) -> bool {
        false
    }
}

impl<T: Clone + Send> SlotValue for Vec<T> {
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

/// An empty assignment map is a legitimate answer (user handles nothing), so
/// it caches like any other value.
impl SlotValue for AssignmentMap {}

/// Unit slots gate side-effecting refreshes where the value lives elsewhere.
impl SlotValue for () {}

struct SlotState<T> {
    value: Option<T>,
    loaded_at: Option<Instant>,
    /// Bumped on every commit (completed load or applied delta), never on a
    /// hit or a failure.
    generation: u64,
    /// Present while a load is in flight. Waiters clone the receiver; the
    /// leader wakes them by dropping the sender after settling state.
    inflight: Option<watch::Receiver<()>>,
}

impl<T> Default for SlotState<T> {
    fn default() -> Self {
        SlotState {
            value: None,
            loaded_at: None,
            generation: 0,
            inflight: None,
        }
    }
}

enum Step<T> {
    Hit(T),
    Wait(watch::Receiver<()>),
    Lead(watch::Sender<()>),
}

pub struct CacheSlot<T> {
    state: Mutex<SlotState<T>>,
    ttl: Duration,
}

impl<T: SlotValue> CacheSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        CacheSlot {
            state: Mutex::new(SlotState::default()),
            ttl,
        }
    }

    /// Clone of the value if it was loaded within the TTL window and is not
    /// vacant.
    fn fresh_value(&self, state: &SlotState<T>) -> Option<T> {
        match (&state.value, state.loaded_at) {
            (Some(value), Some(at)) if at.elapsed() < self.ttl && !value.is_vacant() => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Return the cached value, loading it through `load` when stale.
    ///
    /// - `force` skips the freshness check but still joins an in-flight load.
    /// - Exactly one caller runs `load` per burst; the rest await the same
    ///   flight and share its outcome.
    /// - On failure the previous value and timestamp are kept; waiters of the
    ///   failed flight get a transport error rather than starting a second
    ///   call of their own.
    pub async fn ensure<F, Fut>(&self, force: bool, load: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut load = Some(load);
        loop {
            let step = {
                let mut state = self.state.lock();
                match self.fresh_value(&state) {
                    Some(value) if !force => Step::Hit(value),
                    _ => {
                        if let Some(rx) = &state.inflight {
                            Step::Wait(rx.clone())
                        } else {
                            let (tx, rx) = watch::channel(());
                            state.inflight = Some(rx);
                            Step::Lead(tx)
                        }
                    }
                }
            };

            match step {
                Step::Hit(value) => return Ok(value),
                Step::Wait(mut rx) => {
                    // Wakes when the leader drops the sender.
                    let _ = rx.changed().await;
                    let state = self.state.lock();
                    // Vacancy does not matter here: if the flight landed a
                    // value (even an empty one), waiters share that result.
                    if let (Some(value), Some(at)) = (&state.value, state.loaded_at) {
                        if at.elapsed() < self.ttl {
                            return Ok(value.clone());
                        }
                    }
                    if state.inflight.is_some() {
                        // A new leader already took over; join that flight.
                        continue;
                    }
                    return Err(EngineError::Transport(
                        "shared reference load failed".to_string(),
                    ));
                }
                Step::Lead(tx) => {
                    // The Lead arm always returns, so the FnOnce is available
                    // here even after Wait iterations.
                    let Some(loader) = load.take() else {
                        return Err(EngineError::Transport(
                            "reference load retried within one call".to_string(),
                        ));
                    };
                    let result = loader().await;
                    {
                        let mut state = self.state.lock();
                        state.inflight = None;
                        if let Ok(value) = &result {
                            state.value = Some(value.clone());
                            state.loaded_at = Some(Instant::now());
                            state.generation += 1;
                        }
                    }
                    // Wake waiters only after state has settled.
                    drop(tx);
                    return result;
                }
            }
        }
    }

    /// Snapshot without loading.
    pub fn peek(&self) -> Option<T> {
        self.state.lock().value.clone()
    }

    /// Count of commits the slot has seen. Lets callers key memoized
    /// derivations on the content without holding a copy of it; hits,
    /// failures and `invalidate` leave the count where it was.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Mark stale. The value is kept (for `peek`) but the next `ensure`
    /// reloads.
    pub fn invalidate(&self) {
        self.state.lock().loaded_at = None;
    }

    /// Apply a delta in place and re-stamp freshness, so a push update does
    /// not leave the slot looking stale. Skipped (returns false) when the
    /// slot never completed a load — the delta would otherwise fabricate a
    /// fresh singleton out of nothing.
    pub fn apply_update(&self, apply: impl FnOnce(&mut T)) -> bool {
        let mut state = self.state.lock();
        if state.loaded_at.is_none() {
            return false;
        }
        if let Some(value) = state.value.as_mut() {
            apply(value);
            state.loaded_at = Some(Instant::now());
            state.generation += 1;
            return true;
        }
        false
    }
}
