//! Session orchestration
//!
//! One `SyncEngine` serves the whole process. `login` installs a
//! `SessionState` (store, reference caches, seen tracker, refresh gate,
//! channel) for the authenticated actor; `logout` or the next `login` tears it
//! down. Async work captures the session's `ActorKey` when it starts and
//! re-checks it when it resolves, so a flight started under one login never
//! writes into the next.
//!
//! Consumers observe changes through a broadcast bus of `LocalEvent`s instead
//! of polling; events carry the minimal changed identifier and subscribers
//! re-read whichever snapshot they care about.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::api::{PushConnector, TaskApi};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::normalize::{self, RawTask};
use crate::policy::{self, permissions, scope, Decision, FilterOptions, TaskFilters};
use crate::refcache::ReferenceCaches;
use crate::seen::SeenTracker;
use crate::store::TaskStore;
use crate::sync::{
    ChannelState, LocalEvent, PushEvent, ReferenceScope, RefreshGate, RefreshStatus, SyncChannel,
};
use crate::types::{
    local_task_id, Actor, ActorKey, ConnectionIdentity, Participant, Task, UserRecord,
};

/// Events buffered per subscriber before the slowest one starts losing the
/// oldest.
const EVENT_BUS_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Per-login state
// ---------------------------------------------------------------------------

/// Cached result of the last visibility resolution. Valid while the store
/// generation, the user-directory generation and the filter fingerprint all
/// match — scoping resolves roles through the directory, so a directory
/// reload or push edit re-keys the memo the same way a store write does.
struct VisibleMemo {
    generation: u64,
    directory: u64,
    fingerprint: String,
    tasks: Vec<Task>,
}

struct SessionState {
    actor: Actor,
    key: ActorKey,
    store: TaskStore,
    caches: ReferenceCaches,
    refresh: RefreshGate,
    channel: SyncChannel,
    seen: Mutex<SeenTracker>,
    memo: Mutex<Option<VisibleMemo>>,
    /// Last `RefreshStatus` published on the bus, so coalesced refresh callers
    /// don't re-announce the same transition.
    refresh_emitted: Mutex<Option<RefreshStatus>>,
}

impl SessionState {
    fn new(actor: Actor, api: Arc<dyn TaskApi>, config: &EngineConfig) -> Self {
        let key = ActorKey::of(&actor);
        let seen = SeenTracker::for_actor(&config.data_dir, &actor.email);
        SessionState {
            key,
            store: TaskStore::new(),
            caches: ReferenceCaches::new(api, config),
            refresh: RefreshGate::new(config.tasks_ttl()),
            channel: SyncChannel::new(),
            seen: Mutex::new(seen),
            memo: Mutex::new(None),
            refresh_emitted: Mutex::new(None),
            actor,
        }
    }
}

/// State the push callbacks and in-flight refreshes share with the engine.
struct EngineShared {
    session: Mutex<Option<Arc<SessionState>>>,
    events: broadcast::Sender<LocalEvent>,
}

impl EngineShared {
    fn current(&self) -> Option<Arc<SessionState>> {
        self.session.lock().clone()
    }

    fn is_current(&self, key: &ActorKey) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|session| &session.key == key)
            .unwrap_or(false)
    }

    /// Publish on the bus. A send error just means nobody is subscribed.
    fn emit(&self, event: LocalEvent) {
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SyncEngine {
    api: Arc<dyn TaskApi>,
    connector: Arc<dyn PushConnector>,
    config: EngineConfig,
    shared: Arc<EngineShared>,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn TaskApi>,
        connector: Arc<dyn PushConnector>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        SyncEngine {
            api,
            connector,
            config,
            shared: Arc::new(EngineShared {
                session: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocalEvent> {
        self.shared.events.subscribe()
    }

    pub fn current_actor(&self) -> Option<Actor> {
        self.shared.current().map(|session| session.actor.clone())
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Install a session for `actor`, replacing any previous one. The channel
    /// connect and the initial refresh are attempted here but their failures
    /// are not fatal to the login: both outcomes stay observable through
    /// `channel_state` / `refresh_status`, and both have retry paths
    /// (`ensure_connected`, the next `fetch_tasks`).
    pub async fn login(&self, actor: Actor) {
        self.logout();
        log::info!("Session: login {} ({})", actor.email, actor.role.as_str());

        let session = Arc::new(SessionState::new(actor, self.api.clone(), &self.config));
        *self.shared.session.lock() = Some(session.clone());

        if let Err(err) = self.connect_channel(&session).await {
            log::warn!("Session: channel unavailable after login: {}", err);
        }
        if let Err(err) = self.fetch_tasks(true).await {
            log::warn!("Session: initial refresh failed: {}", err);
        }
    }

    /// Tear the current session down, if any. Synchronous: the channel pump
    /// is aborted before this returns, so no push event lands afterwards.
    pub fn logout(&self) {
        let previous = self.shared.session.lock().take();
        if let Some(session) = previous {
            session.channel.disconnect();
            log::info!("Session: logout {}", session.actor.email);
            self.shared.emit(LocalEvent::ChannelChanged {
                state: ChannelState::Disconnected,
            });
        }
    }

    /// Reconnect the push channel when it is not currently connected. Called
    /// on actor-state evaluation (app focus, wake) rather than on a timer.
    pub async fn ensure_connected(&self) -> Result<()> {
        let session = self.session()?;
        if session.channel.is_connected() {
            return Ok(());
        }
        self.connect_channel(&session).await
    }

    async fn connect_channel(&self, session: &Arc<SessionState>) -> Result<()> {
        let identity = ConnectionIdentity::of(&session.actor);

        let on_event = {
            let shared = self.shared.clone();
            let key = session.key.clone();
            move |event: PushEvent| handle_push(&shared, &key, event)
        };
        let on_state = {
            let shared = self.shared.clone();
            let key = session.key.clone();
            move |state: ChannelState| {
                if shared.is_current(&key) {
                    shared.emit(LocalEvent::ChannelChanged { state });
                }
            }
        };

        session
            .channel
            .connect(self.connector.clone(), identity, on_event, on_state)
            .await
    }

    // ------------------------------------------------------------------
    // Bulk refresh
    // ------------------------------------------------------------------

    /// Bulk task refresh through the single-flight gate; `force` bypasses the
    /// TTL. On success the store is replaced wholesale, the seen-set diff
    /// runs, and `TasksRefreshed` plus one `TaskAssigned` per newly-assigned
    /// task go out on the bus. Returns the store size afterwards.
    pub async fn fetch_tasks(&self, force: bool) -> Result<usize> {
        let session = self.session()?;

        let api = self.api.clone();
        let shared = self.shared.clone();
        let flight = session.clone();
        let result = session
            .refresh
            .run(force, move || async move {
                emit_refresh_transition(&shared, &flight);

                let raw = api.fetch_tasks().await?;
                let tasks = normalize::tasks(&raw);
                if !shared.is_current(&flight.key) {
                    log::debug!(
                        "Refresh: actor changed mid-flight, dropping {} task(s)",
                        tasks.len()
                    );
                    return Ok(());
                }

                let fresh = flight
                    .seen
                    .lock()
                    .detect_new_assignments(&flight.actor, &tasks);
                let count = tasks.len();
                flight.store.set_all(tasks);

                shared.emit(LocalEvent::TasksRefreshed { count });
                for assignment in fresh {
                    shared.emit(LocalEvent::TaskAssigned {
                        task_id: assignment.task_id,
                        title: assignment.title,
                    });
                }
                Ok(())
            })
            .await;

        emit_refresh_transition(&self.shared, &session);
        result.map(|_| session.store.len())
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        self.shared
            .current()
            .map(|session| session.refresh.status())
            .unwrap_or(RefreshStatus::Idle)
    }

    pub fn channel_state(&self) -> ChannelState {
        self.shared
            .current()
            .map(|session| session.channel.state())
            .unwrap_or(ChannelState::Disconnected)
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.shared
            .current()
            .and_then(|session| session.store.last_synced_at())
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Tasks the actor may see under `filters`. Pure read over the current
    /// snapshots; results are memoized on (store generation, directory
    /// generation, filter fingerprint) until any of the three moves.
    pub fn visible_tasks(&self, filters: &TaskFilters) -> Result<Vec<Task>> {
        let session = self.session()?;
        // Key reads come before the snapshots: a commit racing in between
        // leaves the memo stamped stale, never stamped fresh.
        let generation = session.store.generation();
        let directory = session.caches.users_generation();
        let fingerprint = filters.fingerprint();

        if let Some(memo) = session.memo.lock().as_ref() {
            if memo.generation == generation
                && memo.directory == directory
                && memo.fingerprint == fingerprint
            {
                return Ok(memo.tasks.clone());
            }
        }

        let users = session.caches.users_snapshot();
        let now = Local::now().naive_local();
        let visible = policy::resolve_visible_tasks(
            &session.actor,
            session.store.select_all(),
            &users,
            filters,
            now,
        );

        *session.memo.lock() = Some(VisibleMemo {
            generation,
            directory,
            fingerprint,
            tasks: visible.clone(),
        });
        Ok(visible)
    }

    /// Picker options derived from the role-scoped set, before user filters,
    /// so narrowing one picker never empties the others.
    pub fn filter_options(&self) -> Result<FilterOptions> {
        let session = self.session()?;
        let users = session.caches.users_snapshot();
        let scoped = scope::scope_tasks(&session.actor, session.store.select_all(), &users);
        Ok(policy::filter_options(&scoped, &users))
    }

    // ------------------------------------------------------------------
    // Mutation results and optimistic records
    // ------------------------------------------------------------------

    /// Land the echo of an external save/update in the store. Emits
    /// `TaskChanged` only when the stored record actually changed. Payloads
    /// without a usable id are dropped, same as on the bulk path.
    pub fn apply_task_saved(&self, raw: &RawTask) -> Result<Option<Task>> {
        let session = self.session()?;
        let Some(task) = normalize::task(raw) else {
            log::warn!("Session: saved task payload missing id, ignored");
            return Ok(None);
        };
        if session.store.upsert_one(task.clone()) {
            self.shared.emit(LocalEvent::TaskChanged {
                task_id: task.id.clone(),
            });
        }
        Ok(Some(task))
    }

    /// Land the echo of an external delete. Absent ids are a quiet no-op.
    pub fn apply_task_deleted(&self, task_id: &str) -> Result<bool> {
        let session = self.session()?;
        let removed = session.store.remove_one(task_id);
        if removed {
            self.shared.emit(LocalEvent::TaskRemoved {
                task_id: task_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// Insert an optimistic record for a task created locally. The record
    /// gets a `local-` id; when the authority's confirmed copy arrives (push
    /// upsert or save echo) it lands under the real id and the caller retires
    /// the local one with `apply_task_deleted`.
    pub fn create_local_task(&self, mut task: Task) -> Result<Task> {
        let session = self.session()?;
        task.id = local_task_id();
        if task.assigned_by.email.is_empty() {
            task.assigned_by = Participant::from_email(&session.actor.email);
        }
        if task.created_at.is_none() {
            task.created_at = Some(Utc::now());
        }
        session.store.upsert_one(task.clone());
        self.shared.emit(LocalEvent::TaskChanged {
            task_id: task.id.clone(),
        });
        log::debug!("Session: optimistic task {} ({})", task.id, task.title);
        Ok(task)
    }

    // ------------------------------------------------------------------
    // Reference data
    // ------------------------------------------------------------------

    /// Load every reference collection, TTL-gated per collection. A user
    /// directory load re-keys the visibility memo through the directory
    /// generation.
    pub async fn ensure_reference_data(&self, force: bool) -> Result<()> {
        let session = self.session()?;
        session.caches.ensure_users(force).await?;
        session.caches.ensure_brands(force).await?;
        session.caches.ensure_companies(force).await?;
        session.caches.ensure_task_types(force).await?;
        Ok(())
    }

    pub async fn users(&self, force: bool) -> Result<Vec<UserRecord>> {
        let session = self.session()?;
        session.caches.ensure_users(force).await
    }

    /// Brand names the assignee handles within the company. Empty on any
    /// resolution miss.
    pub async fn brands_for(&self, company_name: &str, email: &str) -> Result<Vec<String>> {
        let session = self.session()?;
        Ok(session.caches.brands_for(company_name, email).await)
    }

    /// Task type names applicable to (company, assignee, brand), resolved
    /// through the mapping fallback chain.
    pub async fn task_types_for(
        &self,
        company_name: &str,
        assignee_email: &str,
        brand_name: &str,
    ) -> Result<Vec<String>> {
        let session = self.session()?;
        Ok(session
            .caches
            .task_types_for(company_name, assignee_email, brand_name)
            .await)
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    pub fn can_edit_delete(&self, task: &Task) -> Result<Decision> {
        let session = self.session()?;
        Ok(permissions::can_edit_delete(&session.actor, task))
    }

    pub fn can_edit(&self, task: &Task) -> Result<Decision> {
        let session = self.session()?;
        Ok(permissions::can_edit(
            &session.actor,
            task,
            &self.config.assignee_edit_companies,
        ))
    }

    pub fn can_mark_done(&self, task: &Task) -> Result<Decision> {
        let session = self.session()?;
        Ok(permissions::can_mark_done(&session.actor, task))
    }

    pub fn can_approve_completion(&self, task: &Task) -> Result<Decision> {
        let session = self.session()?;
        Ok(permissions::can_approve_completion(&session.actor, task))
    }

    pub fn can_reassign(&self, task: &Task, candidate: &UserRecord) -> Result<Decision> {
        let session = self.session()?;
        Ok(permissions::can_reassign(&session.actor, task, candidate))
    }

    /// Directory entries the actor may reassign `task` to, display-sorted.
    pub fn eligible_assignees(&self, task: &Task) -> Result<Vec<UserRecord>> {
        let session = self.session()?;
        let users = session.caches.users_snapshot();
        Ok(permissions::eligible_assignees(&session.actor, task, &users))
    }

    fn session(&self) -> Result<Arc<SessionState>> {
        self.shared.current().ok_or(EngineError::NoSession)
    }
}

// ---------------------------------------------------------------------------
// Push dispatch
// ---------------------------------------------------------------------------

/// Entry point for the channel pump. Drops events whose captured key no
/// longer matches the live session.
fn handle_push(shared: &Arc<EngineShared>, key: &ActorKey, event: PushEvent) {
    let Some(session) = shared.current() else {
        log::debug!("Push: {} with no session, dropped", event.kind());
        return;
    };
    if &session.key != key {
        log::debug!("Push: {} for a previous actor, dropped", event.kind());
        return;
    }
    apply_push(shared, &session, event);
}

fn apply_push(shared: &EngineShared, session: &SessionState, event: PushEvent) {
    match event {
        PushEvent::TaskUpserted(task) => {
            let task_id = task.id.clone();
            if session.store.upsert_one(task) {
                shared.emit(LocalEvent::TaskChanged { task_id });
            }
        }
        PushEvent::TaskDeleted { task_id } => {
            if session.store.remove_one(&task_id) {
                shared.emit(LocalEvent::TaskRemoved { task_id });
            }
        }
        PushEvent::BrandUpserted(brand) => {
            if session.caches.apply_brand_upserted(brand) {
                shared.emit(LocalEvent::ReferenceChanged {
                    scope: ReferenceScope::Brands,
                });
            }
        }
        PushEvent::BrandDeleted { brand_id } => {
            if session.caches.apply_brand_deleted(&brand_id) {
                shared.emit(LocalEvent::ReferenceChanged {
                    scope: ReferenceScope::Brands,
                });
            }
        }
        PushEvent::UserUpserted(user) => {
            if session.caches.apply_user_upserted(user) {
                shared.emit(LocalEvent::ReferenceChanged {
                    scope: ReferenceScope::Users,
                });
            }
        }
        PushEvent::UserDeleted { user_id } => {
            if session.caches.apply_user_deleted(&user_id) {
                shared.emit(LocalEvent::ReferenceChanged {
                    scope: ReferenceScope::Users,
                });
            }
        }
        PushEvent::AssignmentUpserted {
            company_name,
            user_id,
            email,
        } => {
            let email = email.or_else(|| {
                let user_id = user_id.as_deref()?;
                session
                    .caches
                    .users_snapshot()
                    .into_iter()
                    .find(|user| user.id == user_id)
                    .map(|user| user.email)
            });
            match email {
                Some(email) if !email.is_empty() => {
                    session.caches.apply_assignment_changed(&company_name, &email);
                }
                _ => {
                    log::debug!(
                        "Push: assignment change at {} without resolvable user, clearing all mappings",
                        company_name
                    );
                    session.caches.apply_assignment_bulk_changed();
                }
            }
            shared.emit(LocalEvent::MappingsChanged);
        }
        PushEvent::AssignmentBulkUpserted => {
            session.caches.apply_assignment_bulk_changed();
            shared.emit(LocalEvent::MappingsChanged);
        }
    }
}

/// Publish the gate's status when it differs from the last one published.
/// Leader and coalesced waiters all funnel through here, so a transition goes
/// out exactly once, and never for a session that has been replaced.
fn emit_refresh_transition(shared: &EngineShared, session: &SessionState) {
    let status = session.refresh.status();
    {
        let mut last = session.refresh_emitted.lock();
        if last.as_ref() == Some(&status) {
            return;
        }
        *last = Some(status.clone());
    }
    if shared.is_current(&session.key) {
        shared.emit(LocalEvent::RefreshChanged { status });
    }
}
