//! Push topic parsing and the local event bus vocabulary.
//!
//! Inbound push frames arrive as a topic string plus a loose JSON payload.
//! `PushEvent::from_topic` turns them into typed events, tolerating the
//! payload shapes the authority actually emits (bare id strings, wrapped
//! objects, embedded records). Unknown topics are skipped, not errors —
//! the authority adds topics faster than clients update.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::normalize;
use crate::types::{Brand, Task, UserRecord};

use super::channel::ChannelState;
use super::refresh::RefreshStatus;

// ---------------------------------------------------------------------------
// Inbound push events
// ---------------------------------------------------------------------------

/// A typed push notification from the authority.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    TaskUpserted(Task),
    TaskDeleted {
        task_id: String,
    },
    BrandUpserted(Brand),
    BrandDeleted {
        brand_id: String,
    },
    UserUpserted(UserRecord),
    UserDeleted {
        user_id: String,
    },
    /// One person's assignment mapping changed at one company. The authority
    /// identifies the person by user id, email, or both depending on the
    /// write path.
    AssignmentUpserted {
        company_name: String,
        user_id: Option<String>,
        email: Option<String>,
    },
    /// A bulk re-mapping touched an unknown set of people.
    AssignmentBulkUpserted,
}

impl PushEvent {
    /// Parse a raw push frame. `Ok(None)` means the frame was understood but
    /// carries nothing actionable (unknown topic, or a payload missing its
    /// id). Malformed record payloads surface as `InvalidPayload`.
    pub fn from_topic(topic: &str, payload: Value) -> Result<Option<PushEvent>> {
        let event = match topic {
            "task:upserted" => {
                let raw: normalize::RawTask = serde_json::from_value(payload)?;
                normalize::task(&raw).map(PushEvent::TaskUpserted)
            }
            "task:deleted" => id_field(&payload, &["taskId", "id", "_id"])
                .map(|task_id| PushEvent::TaskDeleted { task_id }),
            "brand:upserted" => {
                let raw: normalize::RawBrand = serde_json::from_value(payload)?;
                normalize::brand(&raw).map(PushEvent::BrandUpserted)
            }
            "brand:deleted" => id_field(&payload, &["brandId", "id", "_id"])
                .map(|brand_id| PushEvent::BrandDeleted { brand_id }),
            "user:upserted" => {
                let raw: normalize::RawUser = serde_json::from_value(payload)?;
                normalize::user(&raw).map(PushEvent::UserUpserted)
            }
            "user:deleted" => id_field(&payload, &["userId", "id", "_id"])
                .map(|user_id| PushEvent::UserDeleted { user_id }),
            "assignment:upserted" => {
                let company = str_field(&payload, &["companyName", "company"]);
                let user_id = str_field(&payload, &["userId", "_id", "id"]);
                let email = str_field(&payload, &["email", "userEmail"]);
                match company {
                    Some(company_name) if user_id.is_some() || email.is_some() => {
                        Some(PushEvent::AssignmentUpserted {
                            company_name,
                            user_id,
                            email,
                        })
                    }
                    _ => {
                        log::warn!("Push: assignment change without company/identity, ignoring");
                        None
                    }
                }
            }
            "assignment:bulk-upserted" => Some(PushEvent::AssignmentBulkUpserted),
            other => {
                log::debug!("Push: unknown topic '{}', skipping", other);
                None
            }
        };
        Ok(event)
    }

    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::TaskUpserted(_) => "task:upserted",
            PushEvent::TaskDeleted { .. } => "task:deleted",
            PushEvent::BrandUpserted(_) => "brand:upserted",
            PushEvent::BrandDeleted { .. } => "brand:deleted",
            PushEvent::UserUpserted(_) => "user:upserted",
            PushEvent::UserDeleted { .. } => "user:deleted",
            PushEvent::AssignmentUpserted { .. } => "assignment:upserted",
            PushEvent::AssignmentBulkUpserted => "assignment:bulk-upserted",
        }
    }
}

/// Deletion ids arrive either as a bare JSON string or wrapped in an object
/// under one of several historical key names.
fn id_field(payload: &Value, keys: &[&str]) -> Option<String> {
    if let Some(s) = nonempty_str(payload) {
        return Some(s);
    }
    let obj = payload.as_object()?;
    for key in keys {
        if let Some(s) = obj.get(*key).and_then(nonempty_str) {
            return Some(s);
        }
    }
    log::warn!("Push: deletion payload missing id field, ignoring");
    None
}

fn str_field(payload: &Value, keys: &[&str]) -> Option<String> {
    let obj = payload.as_object()?;
    keys.iter().find_map(|key| obj.get(*key).and_then(nonempty_str))
}

fn nonempty_str(value: &Value) -> Option<String> {
    let trimmed = value.as_str()?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Outbound local events
// ---------------------------------------------------------------------------

/// Which reference collection a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceScope {
    Users,
    Brands,
    Companies,
    TaskTypes,
}

/// Event published on the engine's broadcast bus when observable state
/// changes. Subscribers re-read the snapshot they care about; events carry
/// the minimal changed identifier, not the full records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum LocalEvent {
    /// One task changed (push delta or a local mutation result).
    TaskChanged { task_id: String },
    /// One task was removed.
    TaskRemoved { task_id: String },
    /// A bulk refresh replaced the store.
    TasksRefreshed { count: usize },
    /// A task newly assigned to the signed-in user since their last refresh.
    TaskAssigned { task_id: String, title: String },
    /// A reference collection changed.
    ReferenceChanged { scope: ReferenceScope },
    /// Assignment mappings were invalidated.
    MappingsChanged,
    /// The push channel moved to a new lifecycle state.
    ChannelChanged { state: ChannelState },
    /// A refresh pass started, finished, or failed.
    RefreshChanged { status: RefreshStatus },
}
