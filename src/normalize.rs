//! Parse boundary for loose authority payloads
//!
//! The remote authority is permissive about shape: ids arrive as `_id` or
//! `id`, assignment sides as bare strings or embedded user objects, dates as
//! calendar days or full timestamps, enums as free-form labels. This module
//! is the only place that loose shape is accepted. Bulk refresh and push
//! deltas both funnel through it, so the entity store never holds two shapes
//! for the same kind of record.
//!
//! Normalization is total wherever a record's shape allows it: unknown enum
//! labels fold to defaults, absent fields to empty values. A record is only
//! dropped when it has no usable id at all.

use serde::Deserialize;

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{
    AssignmentMap, Brand, Company, HistoryEntry, Participant, Priority, Role, Task, TaskStatus,
    TaskTypeRecord, UserRecord,
};
use crate::util;

// ---------------------------------------------------------------------------
// Raw shapes
// ---------------------------------------------------------------------------

/// `assignedTo` / `assignedBy` arrive as either a bare email/id string or an
/// embedded user summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawUserRef {
    Embedded(RawUserSummary),
    Bare(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawUserSummary {
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawHistoryEntry {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default, alias = "timestamp")]
    pub at: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Raw task payload as the authority sends it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawTask {
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<RawUserRef>,
    #[serde(default)]
    pub assigned_by: Option<RawUserRef>,
    #[serde(default)]
    pub completed_approval: bool,
    #[serde(default)]
    pub history: Vec<RawHistoryEntry>,
    #[serde(default)]
    pub review_stars: Option<u8>,
    #[serde(default)]
    pub review_comment: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default, alias = "manager")]
    pub manager_id: Option<String>,
}

/// Group numbers arrive as JSON numbers or numeric strings depending on the
/// authority's write path.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawGroupNumber {
    Num(u32),
    Text(String),
}

impl RawGroupNumber {
    fn coerce(&self) -> Option<u32> {
        match self {
            RawGroupNumber::Num(n) => Some(*n),
            RawGroupNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawBrand {
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "company")]
    pub company_name: Option<String>,
    #[serde(default)]
    pub group_number: Option<RawGroupNumber>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawCompany {
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawTaskType {
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "company")]
    pub company_name: Option<String>,
}

/// Raw assignment mapping for one (company, user) pair.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawAssignment {
    #[serde(default, alias = "brandNames")]
    pub brands: Vec<String>,
    #[serde(default)]
    pub task_type_ids_by_company_user_brand_key:
        std::collections::HashMap<String, Vec<String>>,
    #[serde(default)]
    pub task_type_ids_by_brand_id: std::collections::HashMap<String, Vec<String>>,
    #[serde(default)]
    pub company_task_type_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Canonical record id: the authority's `_id` wins over the alternate `id`.
pub fn record_id(mongo_id: Option<&str>, alt: Option<&str>) -> Option<String> {
    mongo_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| alt.map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

fn nonempty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Accepts a bare calendar day ("2024-01-12") or a full RFC 3339 timestamp,
/// keeping the date part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolve an assignment side into a `Participant`. Bare strings containing
/// `@` are emails; anything else non-empty is an opaque user id.
pub fn participant(raw: Option<&RawUserRef>) -> Participant {
    match raw {
        None => Participant::default(),
        Some(RawUserRef::Bare(value)) => {
            let value = value.trim();
            if value.is_empty() {
                Participant::default()
            } else if value.contains('@') {
                Participant::from_email(value)
            } else {
                Participant {
                    user_id: Some(value.to_string()),
                    ..Default::default()
                }
            }
        }
        Some(RawUserRef::Embedded(user)) => Participant {
            email: user
                .email
                .as_deref()
                .map(util::email_key)
                .unwrap_or_default(),
            user_id: record_id(user.mongo_id.as_deref(), user.id.as_deref()),
            name: nonempty(user.name.as_deref()),
            role: user.role.as_deref().map(Role::parse),
        },
    }
}

fn history_entry(raw: &RawHistoryEntry) -> Option<HistoryEntry> {
    let action = nonempty(raw.action.as_deref())?;
    Some(HistoryEntry {
        action,
        by: raw
            .by
            .as_deref()
            .map(util::email_key)
            .unwrap_or_default(),
        at: raw.at.as_deref().and_then(parse_datetime),
        note: nonempty(raw.note.as_deref()),
    })
}

/// Normalize a raw task. Returns `None` only when the payload carries no id.
pub fn task(raw: &RawTask) -> Option<Task> {
    let id = record_id(raw.mongo_id.as_deref(), raw.id.as_deref())?;
    Some(Task {
        id,
        title: raw.title.as_deref().unwrap_or_default().trim().to_string(),
        status: raw
            .status
            .as_deref()
            .map(TaskStatus::parse)
            .unwrap_or_default(),
        priority: raw
            .priority
            .as_deref()
            .map(Priority::parse)
            .unwrap_or_default(),
        due_date: raw.due_date.as_deref().and_then(parse_date),
        company_name: raw
            .company_name
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
        brand: raw.brand.as_deref().unwrap_or_default().trim().to_string(),
        brand_id: nonempty(raw.brand_id.as_deref()),
        task_type: raw
            .task_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
        assigned_to: participant(raw.assigned_to.as_ref()),
        assigned_by: participant(raw.assigned_by.as_ref()),
        completed_approval: raw.completed_approval,
        history: raw.history.iter().filter_map(history_entry).collect(),
        review_stars: raw.review_stars,
        review_comment: nonempty(raw.review_comment.as_deref()),
        reviewed_at: raw.reviewed_at.as_deref().and_then(parse_datetime),
        created_at: raw.created_at.as_deref().and_then(parse_datetime),
        updated_at: raw.updated_at.as_deref().and_then(parse_datetime),
    })
}

/// Normalize a batch, dropping id-less records with a warning.
pub fn tasks(raw: &[RawTask]) -> Vec<Task> {
    let mut out = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;
    for item in raw {
        match task(item) {
            Some(t) => out.push(t),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        log::warn!("Normalize: dropped {} task record(s) without an id", dropped);
    }
    out
}

pub fn user(raw: &RawUser) -> Option<UserRecord> {
    let id = record_id(raw.mongo_id.as_deref(), raw.id.as_deref())?;
    Some(UserRecord {
        id,
        email: raw
            .email
            .as_deref()
            .map(util::email_key)
            .unwrap_or_default(),
        name: raw.name.as_deref().unwrap_or_default().trim().to_string(),
        role: raw.role.as_deref().map(Role::parse).unwrap_or_default(),
        company_name: raw
            .company_name
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
        manager_id: nonempty(raw.manager_id.as_deref()),
    })
}

pub fn users(raw: &[RawUser]) -> Vec<UserRecord> {
    raw.iter().filter_map(user).collect()
}

pub fn brand(raw: &RawBrand) -> Option<Brand> {
    let id = record_id(raw.mongo_id.as_deref(), raw.id.as_deref())?;
    Some(Brand {
        id,
        name: raw.name.as_deref().unwrap_or_default().trim().to_string(),
        company_name: raw
            .company_name
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
        group_number: raw.group_number.as_ref().and_then(RawGroupNumber::coerce),
    })
}

pub fn brands(raw: &[RawBrand]) -> Vec<Brand> {
    raw.iter().filter_map(brand).collect()
}

pub fn company(raw: &RawCompany) -> Option<Company> {
    let id = record_id(raw.mongo_id.as_deref(), raw.id.as_deref())?;
    Some(Company {
        id,
        name: raw.name.as_deref().unwrap_or_default().trim().to_string(),
    })
}

pub fn companies(raw: &[RawCompany]) -> Vec<Company> {
    raw.iter().filter_map(company).collect()
}

pub fn task_type(raw: &RawTaskType) -> Option<TaskTypeRecord> {
    let id = record_id(raw.mongo_id.as_deref(), raw.id.as_deref())?;
    Some(TaskTypeRecord {
        id,
        name: raw.name.as_deref().unwrap_or_default().trim().to_string(),
        company_name: raw
            .company_name
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
    })
}

pub fn task_types(raw: &[RawTaskType]) -> Vec<TaskTypeRecord> {
    raw.iter().filter_map(task_type).collect()
}

pub fn assignment(raw: &RawAssignment) -> AssignmentMap {
    AssignmentMap {
        brand_names: raw
            .brands
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect(),
        task_type_ids_by_company_user_brand: raw
            .task_type_ids_by_company_user_brand_key
            .clone(),
        task_type_ids_by_brand: raw.task_type_ids_by_brand_id.clone(),
        company_task_type_ids: raw.company_task_type_ids.clone(),
    }
}
