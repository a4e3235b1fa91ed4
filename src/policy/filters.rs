//! Actor-chosen task filters
//!
//! Stage two of visibility resolution, applied after role scoping. All
//! predicates are pure functions of the task, the selection and an injected
//! clock, so boundary behavior (end-of-day overdue, Monday week starts) is
//! testable without touching wall time.

use chrono::{NaiveDate, NaiveDateTime, Weekday};

use crate::types::{Actor, Task, TaskStatus, UserRecord};
use crate::policy::scope;

/// One filter dimension: everything, or any of a set of lowercase values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterSelection {
    #[default]
    All,
    AnyOf(Vec<String>),
}

impl FilterSelection {
    /// Parse a comma-separated selection. Empty input or the literal `all`
    /// (alone or among other values) selects everything.
    pub fn parse(raw: &str) -> Self {
        let values: Vec<String> = raw
            .split(',')
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() || values.iter().any(|v| v == "all") {
            return FilterSelection::All;
        }
        FilterSelection::AnyOf(values)
    }

    pub fn any_of<I: IntoIterator<Item = S>, S: Into<String>>(values: I) -> Self {
        FilterSelection::AnyOf(
            values
                .into_iter()
                .map(|v| v.into().trim().to_lowercase())
                .collect(),
        )
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            FilterSelection::All => true,
            FilterSelection::AnyOf(values) => {
                let value = value.trim().to_lowercase();
                values.iter().any(|v| *v == value)
            }
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FilterSelection::All)
    }

    fn fingerprint(&self) -> String {
        match self {
            FilterSelection::All => "*".to_string(),
            FilterSelection::AnyOf(values) => values.join(","),
        }
    }
}

/// The full filter set an actor can apply on top of their scope.
///
/// `mine` takes `to-me` / `by-me`; `due` takes `today` / `this-week` /
/// `overdue`. Dimensions AND together; values within one dimension OR.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskFilters {
    pub status: FilterSelection,
    pub priority: FilterSelection,
    pub mine: FilterSelection,
    pub due: FilterSelection,
    pub company: FilterSelection,
    pub brand: FilterSelection,
    pub task_type: FilterSelection,
    pub search: String,
}

impl TaskFilters {
    /// Stable key for memoizing a resolved view.
    pub fn fingerprint(&self) -> String {
        format!(
            "s={}|p={}|m={}|d={}|c={}|b={}|t={}|q={}",
            self.status.fingerprint(),
            self.priority.fingerprint(),
            self.mine.fingerprint(),
            self.due.fingerprint(),
            self.company.fingerprint(),
            self.brand.fingerprint(),
            self.task_type.fingerprint(),
            self.search.trim().to_lowercase()
        )
    }
}

// ---------------------------------------------------------------------------
// Due-date predicates
// ---------------------------------------------------------------------------

/// A task is overdue once its due day has fully elapsed: the boundary is
/// end-of-day 23:59:59.999, so a task due today is *not* overdue until the
/// day rolls over. Completed tasks are never overdue.
pub fn is_overdue(task: &Task, now: NaiveDateTime) -> bool {
    if task.status == TaskStatus::Completed {
        return false;
    }
    match task.due_date.and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999)) {
        Some(end_of_day) => end_of_day < now,
        None => false,
    }
}

pub fn is_due_today(task: &Task, today: NaiveDate) -> bool {
    task.due_date == Some(today)
}

/// Monday-through-Sunday week containing `today`.
pub fn is_due_this_week(task: &Task, today: NaiveDate) -> bool {
    match task.due_date {
        Some(due) => {
            let week = today.week(Weekday::Mon);
            due >= week.first_day() && due <= week.last_day()
        }
        None => false,
    }
}

fn matches_due(task: &Task, selection: &FilterSelection, now: NaiveDateTime) -> bool {
    let values = match selection {
        FilterSelection::All => return true,
        FilterSelection::AnyOf(values) => values,
    };
    let today = now.date();
    values.iter().any(|value| match value.as_str() {
        "today" => is_due_today(task, today),
        "this-week" => is_due_this_week(task, today),
        "overdue" => is_overdue(task, now),
        _ => false,
    })
}

fn matches_mine(task: &Task, selection: &FilterSelection, self_key: &str) -> bool {
    let values = match selection {
        FilterSelection::All => return true,
        FilterSelection::AnyOf(values) => values,
    };
    values.iter().any(|value| match value.as_str() {
        "to-me" => task.assigned_to.is_email(self_key),
        "by-me" => task.assigned_by.is_email(self_key),
        _ => false,
    })
}

/// Free-text match over the title and the resolved assignee label.
fn matches_search(task: &Task, needle: &str, users: &[UserRecord]) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    if task.title.to_lowercase().contains(&needle) {
        return true;
    }
    let label = match scope::lookup_user(users, &task.assigned_to) {
        Some(user) => user.display_label(),
        None => task.assigned_to.display_label(),
    };
    label.to_lowercase().contains(&needle)
}

fn matches(
    task: &Task,
    filters: &TaskFilters,
    self_key: &str,
    users: &[UserRecord],
    now: NaiveDateTime,
) -> bool {
    filters.status.accepts(task.status.as_str())
        && filters.priority.accepts(task.priority.as_str())
        && matches_mine(task, &filters.mine, self_key)
        && matches_due(task, &filters.due, now)
        && filters.company.accepts(&task.company_name)
        && filters.brand.accepts(&task.brand)
        && filters.task_type.accepts(&task.task_type)
        && matches_search(task, &filters.search, users)
}

/// Stage two: apply the actor's filter set to their scoped tasks.
pub fn filter_tasks(
    tasks: Vec<Task>,
    filters: &TaskFilters,
    actor: &Actor,
    users: &[UserRecord],
    now: NaiveDateTime,
) -> Vec<Task> {
    let self_key = actor.email_key();
    tasks
        .into_iter()
        .filter(|task| matches(task, filters, &self_key, users, now))
        .collect()
}
