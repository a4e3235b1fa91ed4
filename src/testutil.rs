//! In-memory doubles for the transport seams, shared across test modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::api::{PushConnector, TaskApi};
use crate::error::{EngineError, Result};
use crate::normalize::{RawAssignment, RawBrand, RawCompany, RawTask, RawTaskType, RawUser};
use crate::sync::events::PushEvent;
use crate::types::ConnectionIdentity;
use crate::util;

/// Route engine logs into the captured test output; `RUST_LOG` opts a run
/// in. The guard makes repeat calls across tests a no-op.
fn capture_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scriptable `TaskApi`: stage raw payloads, flip `fail_*` to simulate
/// transport failures, read `*_calls` to assert fetch counts.
pub struct MockApi {
    tasks: Mutex<Vec<RawTask>>,
    users: Mutex<Vec<RawUser>>,
    brands: Mutex<Vec<RawBrand>>,
    companies: Mutex<Vec<RawCompany>>,
    task_types: Mutex<Vec<RawTaskType>>,
    assignments: Mutex<HashMap<(String, String), RawAssignment>>,

    pub task_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
    pub brand_calls: AtomicUsize,
    pub company_calls: AtomicUsize,
    pub task_type_calls: AtomicUsize,
    pub assignment_calls: AtomicUsize,

    pub fail_tasks: AtomicBool,
    pub fail_users: AtomicBool,
    pub fail_assignments: AtomicBool,
}

impl Default for MockApi {
    fn default() -> Self {
        capture_logs();
        MockApi {
            tasks: Mutex::default(),
            users: Mutex::default(),
            brands: Mutex::default(),
            companies: Mutex::default(),
            task_types: Mutex::default(),
            assignments: Mutex::default(),
            task_calls: AtomicUsize::default(),
            user_calls: AtomicUsize::default(),
            brand_calls: AtomicUsize::default(),
            company_calls: AtomicUsize::default(),
            task_type_calls: AtomicUsize::default(),
            assignment_calls: AtomicUsize::default(),
            fail_tasks: AtomicBool::default(),
            fail_users: AtomicBool::default(),
            fail_assignments: AtomicBool::default(),
        }
    }
}

impl MockApi {
    pub fn push_task(&self, raw: RawTask) {
        self.tasks.lock().push(raw);
    }

    pub fn set_tasks(&self, raw: Vec<RawTask>) {
        *self.tasks.lock() = raw;
    }

    pub fn push_user(&self, id: &str, email: &str, role: &str, company: &str) {
        self.users.lock().push(RawUser {
            id: Some(id.to_string()),
            email: Some(email.to_string()),
            role: Some(role.to_string()),
            company_name: Some(company.to_string()),
            ..Default::default()
        });
    }

    pub fn push_brand(&self, id: &str, name: &str, company: &str) {
        self.brands.lock().push(RawBrand {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            company_name: Some(company.to_string()),
            ..Default::default()
        });
    }

    pub fn push_company(&self, id: &str, name: &str) {
        self.companies.lock().push(RawCompany {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        });
    }

    pub fn push_task_type(&self, id: &str, name: &str, company: &str) {
        self.task_types.lock().push(RawTaskType {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            company_name: Some(company.to_string()),
            ..Default::default()
        });
    }

    pub fn set_assignment(&self, company_name: &str, user_id: &str, raw: RawAssignment) {
        self.assignments
            .lock()
            .insert((util::name_key(company_name), user_id.to_string()), raw);
    }
}

#[async_trait]
impl TaskApi for MockApi {
    async fn fetch_tasks(&self) -> Result<Vec<RawTask>> {
        self.task_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tasks.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("mock: task fetch refused".into()));
        }
        Ok(self.tasks.lock().clone())
    }

    async fn fetch_users(&self) -> Result<Vec<RawUser>> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_users.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("mock: user fetch refused".into()));
        }
        Ok(self.users.lock().clone())
    }

    async fn fetch_brands(&self) -> Result<Vec<RawBrand>> {
        self.brand_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.brands.lock().clone())
    }

    async fn fetch_companies(&self) -> Result<Vec<RawCompany>> {
        self.company_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.companies.lock().clone())
    }

    async fn fetch_task_types(&self) -> Result<Vec<RawTaskType>> {
        self.task_type_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.task_types.lock().clone())
    }

    async fn fetch_assignments(
        &self,
        company_name: &str,
        user_id: &str,
    ) -> Result<RawAssignment> {
        self.assignment_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_assignments.load(Ordering::SeqCst) {
            return Err(EngineError::Transport(
                "mock: assignment fetch refused".into(),
            ));
        }
        Ok(self
            .assignments
            .lock()
            .get(&(util::name_key(company_name), user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Scriptable `PushConnector`. `stage()` queues a stream for the next
/// `connect` and hands back its send side; unstaged connects get a stream
/// nobody writes to (the sender is parked so it stays open).
#[derive(Default)]
pub struct MockConnector {
    staged: Mutex<Vec<mpsc::Receiver<PushEvent>>>,
    parked: Mutex<Vec<mpsc::Sender<PushEvent>>>,
    pub connects: AtomicUsize,
    pub refuse: AtomicBool,
    pub last_identity: Mutex<Option<ConnectionIdentity>>,
}

impl MockConnector {
    pub fn new() -> Self {
        capture_logs();
        Self::default()
    }

    pub fn stage(&self) -> mpsc::Sender<PushEvent> {
        let (tx, rx) = mpsc::channel(16);
        self.staged.lock().push(rx);
        tx
    }
}

#[async_trait]
impl PushConnector for MockConnector {
    async fn connect(&self, identity: ConnectionIdentity) -> Result<mpsc::Receiver<PushEvent>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_identity.lock() = Some(identity);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(EngineError::ChannelClosed("mock: subscription refused".into()));
        }
        let mut staged = self.staged.lock();
        if staged.is_empty() {
            let (tx, rx) = mpsc::channel(16);
            self.parked.lock().push(tx);
            Ok(rx)
        } else {
            Ok(staged.remove(0))
        }
    }
}
