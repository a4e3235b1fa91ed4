//! Core types for the sync engine
//!
//! Everything here is the *normalized* shape: raw authority payloads are
//! parsed exactly once at the `normalize` boundary, so the rest of the engine
//! never sees loose strings where an enum belongs or two id spellings for the
//! same record.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::util;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Parse a loose status label. Unknown vocabulary folds to `Pending`
    /// rather than dropping the record.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().replace('_', "-").as_str() {
            "in-progress" | "inprogress" => TaskStatus::InProgress,
            "completed" | "complete" | "done" => TaskStatus::Completed,
            _ => TaskStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Parse a loose priority label. Unknown vocabulary folds to `Medium`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" | "urgent" | "critical" => Priority::High,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Organizational role. Closed set — role strings the authority has not
/// taught us fold to `User` (least privilege) instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    MdManager,
    Manager,
    ObManager,
    Assistant,
    SubAssistant,
    Sbm,
    Rm,
    Am,
    Ar,
    #[default]
    User,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "super_admin" | "superadmin" => Role::SuperAdmin,
            "admin" => Role::Admin,
            "md_manager" | "mdmanager" => Role::MdManager,
            "manager" => Role::Manager,
            "ob_manager" | "obmanager" => Role::ObManager,
            "assistant" => Role::Assistant,
            "sub_assistant" | "subassistant" => Role::SubAssistant,
            "sbm" => Role::Sbm,
            "rm" => Role::Rm,
            "am" => Role::Am,
            "ar" => Role::Ar,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::MdManager => "md_manager",
            Role::Manager => "manager",
            Role::ObManager => "ob_manager",
            Role::Assistant => "assistant",
            Role::SubAssistant => "sub_assistant",
            Role::Sbm => "sbm",
            Role::Rm => "rm",
            Role::Am => "am",
            Role::Ar => "ar",
            Role::User => "user",
        }
    }

    /// Roles that see every task regardless of assignment.
    pub fn sees_all_tasks(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin | Role::Rm | Role::Am)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Role::Assistant | Role::SubAssistant)
    }

    /// Roles whose visibility is defined by tasks they handed out.
    pub fn is_delegating_manager(&self) -> bool {
        matches!(self, Role::Manager | Role::MdManager)
    }
}

// ---------------------------------------------------------------------------
// Task model
// ---------------------------------------------------------------------------

/// One side of a task assignment, resolved at ingestion from either a bare
/// email/id string or an embedded user summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Canonical identity key (trimmed, lowercased). Empty when the payload
    /// only carried an opaque user id.
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role the authority denormalized into the payload, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Participant {
    pub fn from_email(email: &str) -> Self {
        Participant {
            email: util::email_key(email),
            ..Default::default()
        }
    }

    /// Case-insensitive identity check against an actor email.
    pub fn is_email(&self, email: &str) -> bool {
        !self.email.is_empty() && self.email == util::email_key(email)
    }

    /// Identity check tolerant of the `deleted` suffix on historical records.
    pub fn is_email_lenient(&self, email: &str) -> bool {
        !self.email.is_empty()
            && util::strip_deleted_suffix(&self.email) == util::email_key(email)
    }

    /// Best label available: name, then email, then user id.
    pub fn display_label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        if !self.email.is_empty() {
            return self.email.clone();
        }
        self.user_id.clone().unwrap_or_default()
    }
}

/// Append-only audit entry carried on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,
    #[serde(default)]
    pub by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Normalized task record — the unit the entity store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Calendar day the task is due, timezone-naive. Overdue semantics treat
    /// this as end-of-day 23:59:59.999.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub task_type: String,
    pub assigned_to: Participant,
    pub assigned_by: Participant,
    /// Admin sign-off on a completed task. Once set, the task is locked.
    #[serde(default)]
    pub completed_approval: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_stars: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Locally-created optimistic records carry a `local-` id until the
    /// authority echoes the saved record back with a real one.
    pub fn is_local(&self) -> bool {
        self.id.starts_with("local-")
    }
}

/// Mint an id for an optimistic local record.
pub fn local_task_id() -> String {
    format!("local-{}", uuid::Uuid::new_v4())
}

// ---------------------------------------------------------------------------
// Actors and reference records
// ---------------------------------------------------------------------------

/// The authenticated user an engine session belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub company_name: String,
    /// Back-reference into the role hierarchy (assistant to manager,
    /// am to rm, rm to sbm).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
}

impl Actor {
    pub fn email_key(&self) -> String {
        util::email_key(&self.email)
    }
}

/// Identity captured when async work starts and compared when it resolves,
/// so operations that outlive an actor switch become no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorKey {
    pub email: String,
    pub company: String,
}

impl ActorKey {
    pub fn of(actor: &Actor) -> Self {
        ActorKey {
            email: util::email_key(&actor.email),
            company: util::name_key(&actor.company_name),
        }
    }
}

/// Identity tuple handed to the push connector when subscribing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIdentity {
    pub user_id: String,
    pub role: Role,
    pub company_name: String,
}

impl ConnectionIdentity {
    pub fn of(actor: &Actor) -> Self {
        ConnectionIdentity {
            user_id: actor.id.clone(),
            role: actor.role,
            company_name: actor.company_name.clone(),
        }
    }
}

/// Directory record for a user, served by the reference cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    /// Canonical email key; may be empty for id-only records.
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
}

impl UserRecord {
    /// Best label available for pickers and search: name, then email.
    pub fn display_label(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.trim().to_string();
        }
        self.email.clone()
    }
}

/// Brand record. Brand names are only unique within a company; `group_number`
/// disambiguates duplicates inside one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_number: Option<u32>,
}

impl Brand {
    /// Display label with the group suffix when one exists:
    /// "Northside" / "Northside (Group 2)".
    pub fn display_label(&self) -> String {
        match self.group_number {
            Some(group) => format!("{} (Group {})", self.name, group),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTypeRecord {
    pub id: String,
    pub name: String,
    /// Company the type is scoped to; empty for globally available types.
    #[serde(default)]
    pub company_name: String,
}

/// Per-(company, user) assignment mapping: which brands a user handles and
/// which task types apply per brand. Keys in the first table are built with
/// `util::assignment_key`; the second is keyed by bare brand id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentMap {
    #[serde(default)]
    pub brand_names: Vec<String>,
    /// `companyKey::userId::brandId` → task type ids (most specific).
    #[serde(default)]
    pub task_type_ids_by_company_user_brand: HashMap<String, Vec<String>>,
    /// `brandId` → task type ids (brand-wide fallback).
    #[serde(default)]
    pub task_type_ids_by_brand: HashMap<String, Vec<String>>,
    /// Company-wide fallback when no brand-level entry exists.
    #[serde(default)]
    pub company_task_type_ids: Vec<String>,
}
