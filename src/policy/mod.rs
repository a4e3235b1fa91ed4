//! Role policy: who sees which tasks, and what they may do to them.
//!
//! The pipeline is two pure stages over an in-memory snapshot: role scoping
//! first (`scope`), then user-chosen filters (`filters`). Mutation gating
//! lives in `permissions`. Nothing in here performs I/O; the session layer
//! feeds snapshots in and memoizes on the way out.

pub mod filters;
pub mod permissions;
pub mod scope;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::types::{Actor, Task, UserRecord};
use crate::util;

pub use filters::{FilterSelection, TaskFilters};
pub use permissions::Decision;

/// Scope by role, then apply the actor's filters. This is the only path by
/// which tasks become visible.
pub fn resolve_visible_tasks(
    actor: &Actor,
    tasks: Vec<Task>,
    users: &[UserRecord],
    task_filters: &TaskFilters,
    now: NaiveDateTime,
) -> Vec<Task> {
    let scoped = scope::scope_tasks(actor, tasks, users);
    filters::filter_tasks(scoped, task_filters, actor, users, now)
}

/// Distinct values the filter pickers can offer, derived from the tasks the
/// actor can actually see. Deduplicated case-insensitively, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub companies: Vec<String>,
    pub brands: Vec<String>,
    pub task_types: Vec<String>,
    pub assignees: Vec<String>,
}

/// Collect picker values from an already-scoped task list. Empty fields on
/// individual tasks are skipped rather than surfaced as blank options.
pub fn filter_options(scoped: &[Task], users: &[UserRecord]) -> FilterOptions {
    let mut companies = Vec::new();
    let mut brands = Vec::new();
    let mut task_types = Vec::new();
    let mut assignees = Vec::new();

    for task in scoped {
        push_nonempty(&mut companies, &task.company_name);
        push_nonempty(&mut brands, &task.brand);
        push_nonempty(&mut task_types, &task.task_type);
        let label = scope::lookup_user(users, &task.assigned_to)
            .map(|u| u.display_label())
            .unwrap_or_else(|| task.assigned_to.display_label());
        push_nonempty(&mut assignees, &label);
    }

    FilterOptions {
        companies: util::dedup_sorted_ci(companies),
        brands: util::dedup_sorted_ci(brands),
        task_types: util::dedup_sorted_ci(task_types),
        assignees: util::dedup_sorted_ci(assignees),
    }
}

fn push_nonempty(values: &mut Vec<String>, value: &str) {
    let trimmed = value.trim();
    if !trimmed.is_empty() {
        values.push(trimmed.to_string());
    }
}
