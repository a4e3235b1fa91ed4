//! Normalized task store
//!
//! Single source of truth for task records in a session. Push deltas and bulk
//! refresh both land here, and every read path (visibility, pickers, status
//! surfaces) starts from a snapshot of it.
//!
//! All operations are total and idempotent: upserting an id that exists
//! replaces it, removing an id that does not exist is a no-op, and applying
//! the same payload twice leaves the store byte-identical. A generation
//! counter advances only on observable change, which is what the policy
//! layer's memoization keys off.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::Task;

#[derive(Default)]
struct StoreInner {
    /// BTreeMap keeps snapshot order stable across identical states.
    tasks: BTreeMap<String, Task>,
    last_synced_at: Option<DateTime<Utc>>,
    generation: u64,
}

#[derive(Default)]
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one task. No-op (generation preserved) when the
    /// stored record is already structurally identical.
    pub fn upsert_one(&self, task: Task) -> bool {
        let mut inner = self.inner.write();
        if inner.tasks.get(&task.id) == Some(&task) {
            return false;
        }
        inner.tasks.insert(task.id.clone(), task);
        inner.generation += 1;
        true
    }

    /// Batch upsert. Bumps the generation once when anything changed.
    pub fn upsert_many(&self, tasks: Vec<Task>) -> usize {
        if tasks.is_empty() {
            return 0;
        }
        let mut inner = self.inner.write();
        let mut changed = 0;
        for task in tasks {
            if inner.tasks.get(&task.id) == Some(&task) {
                continue;
            }
            inner.tasks.insert(task.id.clone(), task);
            changed += 1;
        }
        if changed > 0 {
            inner.generation += 1;
        }
        changed
    }

    /// Remove by id. Absent ids are a no-op.
    pub fn remove_one(&self, task_id: &str) -> bool {
        let mut inner = self.inner.write();
        let removed = inner.tasks.remove(task_id).is_some();
        if removed {
            inner.generation += 1;
        }
        removed
    }

    /// Replace the whole collection atomically and stamp the sync time.
    /// Only the bulk refresh path calls this.
    pub fn set_all(&self, tasks: Vec<Task>) {
        let mut inner = self.inner.write();
        inner.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        inner.last_synced_at = Some(Utc::now());
        inner.generation += 1;
    }

    pub fn select_all(&self) -> Vec<Task> {
        self.inner.read().tasks.values().cloned().collect()
    }

    pub fn select_by_id(&self, task_id: &str) -> Option<Task> {
        self.inner.read().tasks.get(task_id).cloned()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.inner.read().tasks.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tasks.is_empty()
    }

    /// When the last successful bulk refresh landed, if any.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_synced_at
    }

    /// Monotonic change counter. Advances only on observable change.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}
