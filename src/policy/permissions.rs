//! Permission decisions
//!
//! Every mutation surface asks here first. Outcomes are `Decision`s — an
//! allow, or a deny carrying one of the fixed user-facing reasons — never
//! errors, so callers can render them directly without string matching.
//!
//! Identity comparisons run on canonical email keys; the assigner check is
//! lenient about the `deleted` suffix historical records carry.

use serde::Serialize;

use crate::types::{Actor, Role, Task, TaskStatus, UserRecord};
use crate::util;

// Fixed denial reasons. These are surfaced verbatim.
pub const MSG_LOCKED: &str = "Task is locked: completion already approved";
pub const MSG_VIEW_ONLY: &str = "View-only role cannot modify tasks";
pub const MSG_NOT_ASSIGNER: &str = "Only the task assigner or an admin can edit or delete this task";
pub const MSG_NOT_EDITABLE: &str = "You do not have permission to edit this task";
pub const MSG_OB_CANNOT_COMPLETE: &str = "Onboarding managers cannot mark tasks done";
pub const MSG_ONLY_ASSIGNEE: &str = "Only the assignee can mark this task done";
pub const MSG_NOT_COMPLETED: &str = "Only a completed task can be approved";
pub const MSG_ALREADY_APPROVED: &str = "Completion already approved";
pub const MSG_ONLY_ADMIN_APPROVES: &str = "Only an admin can approve completion";
pub const MSG_NO_REASSIGN: &str = "You cannot reassign tasks";
pub const MSG_REASSIGN_ROLE: &str = "This user's role cannot receive tasks from you";
pub const MSG_REASSIGN_COMPANY: &str = "Cannot reassign across companies";

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl Decision {
    fn allow() -> Self {
        Decision {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Decision {
            allowed: false,
            reason: Some(reason),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn reason(&self) -> Option<&'static str> {
        self.reason
    }
}

/// Edit/delete surface: the assigner owns the task; admins override. The
/// regional view-all roles are explicitly read-only here regardless of
/// whether they assigned the task.
pub fn can_edit_delete(actor: &Actor, task: &Task) -> Decision {
    if matches!(actor.role, Role::Rm | Role::Am) {
        return Decision::deny(MSG_VIEW_ONLY);
    }
    if actor.role.is_admin() {
        return Decision::allow();
    }
    if task.assigned_by.is_email_lenient(&actor.email) {
        return Decision::allow();
    }
    Decision::deny(MSG_NOT_ASSIGNER)
}

/// Broader edit surface used by inline edits. Approved tasks are locked for
/// everyone. `assignee_edit_companies` lists companies whose assignees may
/// edit their own tasks.
pub fn can_edit(actor: &Actor, task: &Task, assignee_edit_companies: &[String]) -> Decision {
    if task.completed_approval {
        return Decision::deny(MSG_LOCKED);
    }
    if actor.role.sees_all_tasks() {
        return Decision::allow();
    }
    if task.assigned_by.is_email_lenient(&actor.email) {
        return Decision::allow();
    }
    if task.assigned_to.is_email(&actor.email)
        && company_in(&task.company_name, assignee_edit_companies)
    {
        return Decision::allow();
    }
    Decision::deny(MSG_NOT_EDITABLE)
}

/// Marking done belongs to the assignee alone; admin authority over a
/// finished task lives in the separate `can_approve_completion` sign-off,
/// not here.
pub fn can_mark_done(actor: &Actor, task: &Task) -> Decision {
    if task.completed_approval {
        return Decision::deny(MSG_LOCKED);
    }
    if actor.role == Role::ObManager {
        return Decision::deny(MSG_OB_CANNOT_COMPLETE);
    }
    if task.assigned_to.is_email(&actor.email) {
        return Decision::allow();
    }
    Decision::deny(MSG_ONLY_ASSIGNEE)
}

/// Admin sign-off on a completed task. Locks the task once granted.
pub fn can_approve_completion(actor: &Actor, task: &Task) -> Decision {
    if task.status != TaskStatus::Completed {
        return Decision::deny(MSG_NOT_COMPLETED);
    }
    if task.completed_approval {
        return Decision::deny(MSG_ALREADY_APPROVED);
    }
    if actor.role.is_admin() {
        return Decision::allow();
    }
    Decision::deny(MSG_ONLY_ADMIN_APPROVES)
}

/// Reassignment matrix. Under an admin everything goes; other roles hand
/// tasks only to the role classes below them (or back to themselves), and
/// never across companies.
pub fn can_reassign(actor: &Actor, task: &Task, candidate: &UserRecord) -> Decision {
    if task.completed_approval {
        return Decision::deny(MSG_LOCKED);
    }
    if actor.role.is_admin() {
        return Decision::allow();
    }

    let candidate_key = util::email_key(&candidate.email);
    let to_self = !candidate_key.is_empty() && candidate_key == actor.email_key();
    let role_allows = match actor.role {
        Role::Manager => to_self || candidate.role.is_assistant(),
        Role::MdManager => to_self || candidate.role.is_assistant() || candidate.role == Role::Manager,
        Role::ObManager => to_self || candidate.role.is_assistant(),
        Role::Sbm => matches!(candidate.role, Role::Rm | Role::Am),
        Role::Rm => candidate.role == Role::Am,
        _ => return Decision::deny(MSG_NO_REASSIGN),
    };
    if !role_allows {
        return Decision::deny(MSG_REASSIGN_ROLE);
    }
    if !to_self && !same_company(&candidate.company_name, &task.company_name) {
        return Decision::deny(MSG_REASSIGN_COMPANY);
    }
    Decision::allow()
}

/// Users the actor may hand this task to, picker-sorted.
pub fn eligible_assignees(actor: &Actor, task: &Task, users: &[UserRecord]) -> Vec<UserRecord> {
    let mut eligible: Vec<UserRecord> = users
        .iter()
        .filter(|candidate| can_reassign(actor, task, candidate).is_allowed())
        .cloned()
        .collect();
    eligible.sort_by_key(|u| u.display_label().to_lowercase());
    eligible
}

fn company_in(company_name: &str, list: &[String]) -> bool {
    let key = util::name_key(company_name);
    !key.is_empty() && list.iter().any(|c| util::name_key(c) == key)
}

fn same_company(a: &str, b: &str) -> bool {
    util::name_key(a) == util::name_key(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Participant, Priority};

    fn make_actor(email: &str, role: Role) -> Actor {
        Actor {
            id: format!("id-{}", email),
            email: email.to_string(),
            role,
            company_name: "Acme Corp".to_string(),
            manager_id: None,
        }
    }

    fn make_user(email: &str, role: Role, company: &str) -> UserRecord {
        UserRecord {
            id: format!("id-{}", email),
            email: email.to_string(),
            name: String::new(),
            role,
            company_name: company.to_string(),
            manager_id: None,
        }
    }

    fn make_task(to: &str, by: &str) -> Task {
        Task {
            id: "t1".to_string(),
            title: "Audit".to_string(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            due_date: None,
            company_name: "Acme Corp".to_string(),
            brand: String::new(),
            brand_id: None,
            task_type: String::new(),
            assigned_to: Participant::from_email(to),
            assigned_by: Participant::from_email(by),
            completed_approval: false,
            history: Vec::new(),
            review_stars: None,
            review_comment: None,
            reviewed_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    // --- edit/delete ---

    #[test]
    fn test_edit_delete_assigner_and_admin_only() {
        let task = make_task("helper@acme.com", "mgr@acme.com");

        assert!(can_edit_delete(&make_actor("mgr@acme.com", Role::Manager), &task).is_allowed());
        assert!(can_edit_delete(&make_actor("root@hq.com", Role::Admin), &task).is_allowed());

        let outsider = can_edit_delete(&make_actor("helper@acme.com", Role::Assistant), &task);
        assert!(!outsider.is_allowed());
        assert_eq!(outsider.reason(), Some(MSG_NOT_ASSIGNER));
    }

    #[test]
    fn test_edit_delete_view_only_roles_denied_even_as_assigner() {
        let task = make_task("helper@acme.com", "rm@hq.com");
        let decision = can_edit_delete(&make_actor("rm@hq.com", Role::Rm), &task);
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason(), Some(MSG_VIEW_ONLY));
    }

    #[test]
    fn test_edit_delete_assigner_match_survives_deleted_suffix() {
        let mut task = make_task("helper@acme.com", "mgr@acme.com");
        task.assigned_by.email = "mgr@acme.comdeleted".to_string();
        assert!(can_edit_delete(&make_actor("mgr@acme.com", Role::Manager), &task).is_allowed());
    }

    // --- edit ---

    #[test]
    fn test_edit_locked_for_everyone_once_approved() {
        let mut task = make_task("helper@acme.com", "mgr@acme.com");
        task.status = TaskStatus::Completed;
        task.completed_approval = true;

        for (email, role) in [
            ("root@hq.com", Role::SuperAdmin),
            ("mgr@acme.com", Role::Manager),
            ("helper@acme.com", Role::Assistant),
        ] {
            let decision = can_edit(&make_actor(email, role), &task, &[]);
            assert!(!decision.is_allowed(), "{} should be locked out", email);
            assert_eq!(decision.reason(), Some(MSG_LOCKED));
        }
    }

    #[test]
    fn test_edit_assignee_allowed_only_in_listed_companies() {
        let task = make_task("helper@acme.com", "mgr@acme.com");
        let actor = make_actor("helper@acme.com", Role::Assistant);

        assert!(!can_edit(&actor, &task, &[]).is_allowed());
        let listed = vec!["acme  corp".to_string()];
        assert!(can_edit(&actor, &task, &listed).is_allowed());
    }

    #[test]
    fn test_edit_view_all_roles_allowed_here() {
        let task = make_task("helper@acme.com", "mgr@acme.com");
        assert!(can_edit(&make_actor("rm@hq.com", Role::Rm), &task, &[]).is_allowed());
    }

    // --- mark done ---

    #[test]
    fn test_mark_done_assignee_only() {
        let task = make_task("helper@acme.com", "mgr@acme.com");

        assert!(can_mark_done(&make_actor("helper@acme.com", Role::Assistant), &task).is_allowed());

        // Neither the assigner nor an admin completes on the assignee's
        // behalf; admins hold the approval authority instead.
        for (email, role) in [
            ("mgr@acme.com", Role::Manager),
            ("root@hq.com", Role::Admin),
            ("root@hq.com", Role::SuperAdmin),
        ] {
            let decision = can_mark_done(&make_actor(email, role), &task);
            assert!(!decision.is_allowed(), "{:?} is not the assignee", role);
            assert_eq!(decision.reason(), Some(MSG_ONLY_ASSIGNEE));
        }
    }

    #[test]
    fn test_mark_done_denied_for_ob_manager_even_as_assignee() {
        let task = make_task("ob@acme.com", "mgr@acme.com");
        let decision = can_mark_done(&make_actor("ob@acme.com", Role::ObManager), &task);
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason(), Some(MSG_OB_CANNOT_COMPLETE));
    }

    // --- approval ---

    #[test]
    fn test_approval_requires_completed_unapproved_and_admin() {
        let mut task = make_task("helper@acme.com", "mgr@acme.com");
        let admin = make_actor("root@hq.com", Role::Admin);

        assert_eq!(
            can_approve_completion(&admin, &task).reason(),
            Some(MSG_NOT_COMPLETED)
        );

        task.status = TaskStatus::Completed;
        assert!(can_approve_completion(&admin, &task).is_allowed());
        assert_eq!(
            can_approve_completion(&make_actor("mgr@acme.com", Role::Manager), &task).reason(),
            Some(MSG_ONLY_ADMIN_APPROVES)
        );

        task.completed_approval = true;
        assert_eq!(
            can_approve_completion(&admin, &task).reason(),
            Some(MSG_ALREADY_APPROVED)
        );
    }

    #[test]
    fn test_marking_done_does_not_imply_approval() {
        let mut task = make_task("helper@acme.com", "mgr@acme.com");
        let helper = make_actor("helper@acme.com", Role::Assistant);

        assert!(can_mark_done(&helper, &task).is_allowed());
        // Completion leaves the approval gate closed until an admin signs off.
        task.status = TaskStatus::Completed;
        assert!(!task.completed_approval);
        assert!(!can_approve_completion(&helper, &task).is_allowed());
        assert!(can_approve_completion(&make_actor("root@hq.com", Role::Admin), &task).is_allowed());
    }

    // --- reassignment ---

    #[test]
    fn test_reassign_matrix_by_role() {
        let task = make_task("helper@acme.com", "mgr@acme.com");
        let assistant = make_user("helper2@acme.com", Role::Assistant, "Acme Corp");
        let manager = make_user("mgr2@acme.com", Role::Manager, "Acme Corp");
        let am = make_user("am@hq.com", Role::Am, "Acme Corp");
        let rm = make_user("rm@hq.com", Role::Rm, "Acme Corp");

        // Admin: anyone.
        let admin = make_actor("root@hq.com", Role::Admin);
        assert!(can_reassign(&admin, &task, &manager).is_allowed());

        // Manager: assistants yes, managers no.
        let mgr = make_actor("mgr@acme.com", Role::Manager);
        assert!(can_reassign(&mgr, &task, &assistant).is_allowed());
        assert_eq!(
            can_reassign(&mgr, &task, &manager).reason(),
            Some(MSG_REASSIGN_ROLE)
        );

        // MdManager: assistants and managers.
        let md = make_actor("md@acme.com", Role::MdManager);
        assert!(can_reassign(&md, &task, &assistant).is_allowed());
        assert!(can_reassign(&md, &task, &manager).is_allowed());

        // Sbm: regional roles.
        let sbm = make_actor("sbm@acme.com", Role::Sbm);
        assert!(can_reassign(&sbm, &task, &rm).is_allowed());
        assert!(can_reassign(&sbm, &task, &am).is_allowed());
        assert!(!can_reassign(&sbm, &task, &assistant).is_allowed());

        // Rm: Am only.
        let rm_actor = make_actor("rm@hq.com", Role::Rm);
        assert!(can_reassign(&rm_actor, &task, &am).is_allowed());
        assert!(!can_reassign(&rm_actor, &task, &rm).is_allowed());

        // Assistants cannot reassign at all.
        let helper = make_actor("helper@acme.com", Role::Assistant);
        assert_eq!(
            can_reassign(&helper, &task, &assistant).reason(),
            Some(MSG_NO_REASSIGN)
        );
    }

    #[test]
    fn test_reassign_company_bound_except_to_self() {
        let task = make_task("helper@acme.com", "mgr@acme.com");
        let mgr = make_actor("mgr@acme.com", Role::Manager);

        let foreign = make_user("helper@globex.com", Role::Assistant, "Globex");
        assert_eq!(
            can_reassign(&mgr, &task, &foreign).reason(),
            Some(MSG_REASSIGN_COMPANY)
        );

        // Taking a task back onto yourself ignores the company check.
        let self_record = make_user("mgr@acme.com", Role::Manager, "Globex");
        assert!(can_reassign(&mgr, &task, &self_record).is_allowed());
    }

    #[test]
    fn test_reassign_locked_task_denied() {
        let mut task = make_task("helper@acme.com", "mgr@acme.com");
        task.completed_approval = true;
        let admin = make_actor("root@hq.com", Role::Admin);
        let assistant = make_user("helper2@acme.com", Role::Assistant, "Acme Corp");
        assert_eq!(
            can_reassign(&admin, &task, &assistant).reason(),
            Some(MSG_LOCKED)
        );
    }

    #[test]
    fn test_eligible_assignees_sorted_and_filtered() {
        let task = make_task("helper@acme.com", "mgr@acme.com");
        let mgr = make_actor("mgr@acme.com", Role::Manager);
        let users = vec![
            make_user("zoe@acme.com", Role::Assistant, "Acme Corp"),
            make_user("amy@acme.com", Role::SubAssistant, "Acme Corp"),
            make_user("boss@acme.com", Role::Admin, "Acme Corp"),
            make_user("far@globex.com", Role::Assistant, "Globex"),
        ];
        let eligible = eligible_assignees(&mgr, &task, &users);
        let emails: Vec<&str> = eligible.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["amy@acme.com", "zoe@acme.com"]);
    }
}
