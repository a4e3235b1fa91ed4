//! Previously-seen task tracking.
//!
//! After each successful bulk refresh the session asks this tracker which of
//! the fetched tasks are newly assigned to the signed-in actor, then
//! persists the full fetched id set as the new baseline. The file is scoped
//! by actor email slug, so switching accounts switches files and nothing
//! leaks between identities.
//!
//! Everything here is advisory. Persistence failures are logged and
//! swallowed; a refresh never fails because a notification heuristic could
//! not write its state.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Actor, Task};
use crate::util;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeenFile {
    seen_task_ids: BTreeSet<String>,
}

/// A task the actor has not been shown before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub task_id: String,
    pub title: String,
}

pub struct SeenTracker {
    path: PathBuf,
    seen: BTreeSet<String>,
    /// False until a persisted baseline exists. The first refresh for a new
    /// actor only records the baseline; notifying on every historical task
    /// at first login would be noise, not news.
    primed: bool,
}

impl SeenTracker {
    /// Open (or initialize) the tracker for one actor. Never fails: a
    /// missing file starts unprimed, an unreadable one is treated the same
    /// after a warning.
    pub fn for_actor(data_dir: &Path, email: &str) -> SeenTracker {
        let path = data_dir
            .join("seen")
            .join(format!("{}.json", util::email_slug(email)));
        match load(&path) {
            Some(seen) => SeenTracker {
                path,
                seen,
                primed: true,
            },
            None => SeenTracker {
                path,
                seen: BTreeSet::new(),
                primed: false,
            },
        }
    }

    /// Diff the fetched snapshot against the baseline: tasks assigned to the
    /// actor, absent from the baseline, and not self-assigned. Then persist
    /// every fetched id as the new baseline.
    pub fn detect_new_assignments(&mut self, actor: &Actor, tasks: &[Task]) -> Vec<NewAssignment> {
        let mut fresh = Vec::new();
        if self.primed {
            for task in tasks {
                if task.assigned_to.is_email(&actor.email)
                    && !self.seen.contains(&task.id)
                    && !task.assigned_by.is_email_lenient(&actor.email)
                {
                    fresh.push(NewAssignment {
                        task_id: task.id.clone(),
                        title: task.title.clone(),
                    });
                }
            }
        }

        self.seen = tasks.iter().map(|t| t.id.clone()).collect();
        self.primed = true;
        if let Err(err) = self.save() {
            log::warn!("Seen: persist failed for {}: {}", self.path.display(), err);
        }

        if !fresh.is_empty() {
            log::info!("Seen: {} new assignment(s) for {}", fresh.len(), actor.email);
        }
        fresh
    }

    fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = SeenFile {
            seen_task_ids: self.seen.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, json)
    }

    #[cfg(test)]
    fn seen_ids(&self) -> &BTreeSet<String> {
        &self.seen
    }
}

fn load(path: &Path) -> Option<BTreeSet<String>> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<SeenFile>(&raw) {
        Ok(file) => Some(file.seen_task_ids),
        Err(err) => {
            log::warn!("Seen: unreadable state at {}: {}", path.display(), err);
            None
        }
    }
}
