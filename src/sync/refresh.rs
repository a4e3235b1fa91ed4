//! Refresh coalescing gate.
//!
//! A full refresh (tasks plus whatever reference data the pass pulls in) is
//! expensive, and every surface wants one at the same moments: login, window
//! focus, channel reconnect. The gate collapses concurrent requests into a
//! single pass and absorbs repeat requests inside the TTL window, reusing
//! the cache-slot single-flight machinery with a unit value.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Result, SyncFault};
use crate::refcache::slot::CacheSlot;

/// Where the latest refresh pass stands. `Failed` keeps the fault so status
/// surfaces can show it until the next attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RefreshStatus {
    Idle,
    InProgress,
    Success { at: DateTime<Utc> },
    Failed { fault: SyncFault },
}

pub struct RefreshGate {
    slot: CacheSlot<()>,
    status: Mutex<RefreshStatus>,
}

impl RefreshGate {
    pub fn new(ttl: Duration) -> Self {
        RefreshGate {
            slot: CacheSlot::new(ttl),
            status: Mutex::new(RefreshStatus::Idle),
        }
    }

    /// Run `op` unless a pass already ran inside the TTL window. Concurrent
    /// callers join the in-flight pass and share its outcome; `force` skips
    /// the freshness check but still joins a running pass. Failed passes
    /// leave the gate open, so the next call retries.
    pub async fn run<F, Fut>(&self, force: bool, op: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let status = &self.status;
        let result = self
            .slot
            .ensure(force, || async move {
                *status.lock() = RefreshStatus::InProgress;
                let outcome = op().await;
                match &outcome {
                    Ok(()) => {
                        *status.lock() = RefreshStatus::Success { at: Utc::now() };
                    }
                    Err(err) => {
                        log::warn!("Refresh: pass failed: {}", err);
                        *status.lock() = RefreshStatus::Failed {
                            fault: SyncFault::from(err),
                        };
                    }
                }
                outcome
            })
            .await;
        if result.is_err() {
            // No TTL credit survives a failure, even one forced mid-window.
            self.slot.invalidate();
        }
        result
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.lock().clone()
    }

    /// Open the gate: the next non-forced `run` performs a real pass even if
    /// the TTL window has not elapsed.
    pub fn invalidate(&self) {
        self.slot.invalidate();
    }

    /// Back to a blank gate. Used on logout.
    pub fn reset(&self) {
        self.slot.invalidate();
        *self.status.lock() = RefreshStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn gate() -> RefreshGate {
        RefreshGate::new(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_coalesce() {
        let gate = gate();
        let calls = Arc::new(AtomicUsize::new(0));

        let op = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        };

        let (a, b) = tokio::join!(
            gate.run(false, || op(calls.clone())),
            gate.run(false, || op(calls.clone())),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_window_absorbs_repeat_runs() {
        let gate = gate();
        let calls = Arc::new(AtomicUsize::new(0));
        let op = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        gate.run(false, || op(calls.clone())).await.ok();
        tokio::time::advance(Duration::from_secs(30)).await;
        gate.run(false, || op(calls.clone())).await.ok();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "inside TTL is a no-op");

        tokio::time::advance(Duration::from_secs(31)).await;
        gate.run(false, || op(calls.clone())).await.ok();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "past TTL runs again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_runs_inside_ttl() {
        let gate = gate();
        let calls = Arc::new(AtomicUsize::new(0));
        let op = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        gate.run(false, || op(calls.clone())).await.ok();
        gate.run(true, || op(calls.clone())).await.ok();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_leaves_gate_open_and_records_fault() {
        let gate = gate();

        let result = gate
            .run(false, || async { Err(EngineError::Transport("502".into())) })
            .await;
        assert!(result.is_err());
        match gate.status() {
            RefreshStatus::Failed { fault } => {
                assert!(fault.can_retry);
                assert_eq!(fault.kind, "transport");
            }
            other => panic!("expected failed status, got {:?}", other),
        }

        // No TTL credit for a failed pass: the next plain run retries.
        let retried = gate.run(false, || async { Ok(()) }).await;
        assert!(retried.is_ok());
        assert!(matches!(gate.status(), RefreshStatus::Success { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_failure_revokes_earlier_ttl_credit() {
        let gate = gate();
        let calls = Arc::new(AtomicUsize::new(0));
        let op = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        gate.run(false, || op(calls.clone())).await.ok();
        gate.run(true, || async { Err(EngineError::Transport("502".into())) })
            .await
            .ok();
        assert!(matches!(gate.status(), RefreshStatus::Failed { .. }));

        // The earlier success is still inside the TTL window, but the failed
        // pass reopened the gate: a plain run retries instead of hitting.
        gate.run(false, || op(calls.clone())).await.ok();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(gate.status(), RefreshStatus::Success { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_reopens_inside_ttl() {
        let gate = gate();
        let calls = Arc::new(AtomicUsize::new(0));
        let op = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        gate.run(false, || op(calls.clone())).await.ok();
        gate.invalidate();
        gate.run(false, || op(calls.clone())).await.ok();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_returns_to_idle() {
        let gate = gate();
        gate.run(false, || async { Ok(()) }).await.ok();
        assert!(matches!(gate.status(), RefreshStatus::Success { .. }));

        gate.reset();
        assert_eq!(gate.status(), RefreshStatus::Idle);
    }
}
