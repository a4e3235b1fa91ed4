//! Role-based task scoping
//!
//! Stage one of visibility resolution: which tasks an actor is allowed to see
//! at all, before any of their chosen filters apply. The rules form a closed
//! table over `Role`; unknown roles were already folded to `Role::User` at
//! the normalize boundary and get the narrowest scope.

use crate::types::{Actor, Participant, Role, Task, UserRecord};
use crate::util;

/// Task type name managers never see, even on tasks they assigned.
const MANAGER_EXCLUDED_TYPE: &str = "other work";

/// Resolve a participant's role: the denormalized role on the payload wins,
/// then the user directory, then unknown.
pub fn effective_role(participant: &Participant, users: &[UserRecord]) -> Option<Role> {
    if let Some(role) = participant.role {
        return Some(role);
    }
    lookup_user(users, participant).map(|u| u.role)
}

/// Find a participant in the directory by email key first, opaque id second.
pub fn lookup_user<'a>(users: &'a [UserRecord], participant: &Participant) -> Option<&'a UserRecord> {
    if !participant.email.is_empty() {
        if let Some(user) = users.iter().find(|u| u.email == participant.email) {
            return Some(user);
        }
    }
    if let Some(id) = participant.user_id.as_deref() {
        return users.iter().find(|u| u.id == id);
    }
    None
}

fn in_scope(actor: &Actor, self_key: &str, task: &Task, users: &[UserRecord]) -> bool {
    let to_self = task.assigned_to.is_email(self_key);
    let by_self = task.assigned_by.is_email(self_key);

    match actor.role {
        role if role.sees_all_tasks() => true,

        Role::ObManager => {
            to_self
                || effective_role(&task.assigned_to, users)
                    .map(|r| r.is_assistant())
                    .unwrap_or(false)
        }

        Role::Manager | Role::MdManager => {
            if util::name_key(&task.task_type) == MANAGER_EXCLUDED_TYPE {
                return false;
            }
            by_self
                || (to_self
                    && effective_role(&task.assigned_by, users) == Some(Role::MdManager))
        }

        // Assistant, SubAssistant, Sbm, Ar, User: own traffic only.
        _ => to_self || by_self,
    }
}

/// Stage one: drop everything outside the actor's role scope.
pub fn scope_tasks(actor: &Actor, tasks: Vec<Task>, users: &[UserRecord]) -> Vec<Task> {
    let self_key = actor.email_key();
    let before = tasks.len();
    let scoped: Vec<Task> = tasks
        .into_iter()
        .filter(|task| in_scope(actor, &self_key, task, users))
        .collect();
    log::debug!(
        "Policy: scoped {} of {} task(s) for {} ({})",
        scoped.len(),
        before,
        self_key,
        actor.role.as_str()
    );
    scoped
}
