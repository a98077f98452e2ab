#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing_subscriber::EnvFilter;

use consortium_kernel::{
    Domain, DomainRole, FixedClock, InMemoryObjectStore, Job, JobShape, JobSpec, KernelError,
    LabelSelector, ObjectKind, ObjectStore, ScheduleMode, StoredObject, Task, TaskPhase,
    TaskTemplate, TypedObjectStore,
};
use consortium_runtime::{ConsortiumRuntime, RuntimeConfig};

pub const NAMESPACE: &str = "cross-domain";

/// Installs a test subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub store: Arc<InMemoryObjectStore>,
    pub clock: Arc<FixedClock>,
    pub runtime: ConsortiumRuntime,
}

impl Harness {
    /// Fresh store with `alice` (local) and `bob` (partner) registered.
    pub fn new(config: RuntimeConfig) -> Self {
        init_tracing();
        let store = Arc::new(InMemoryObjectStore::new());
        register_domain(store.as_ref(), "alice", DomainRole::Local);
        register_domain(store.as_ref(), "bob", DomainRole::Partner);
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).single().expect("valid time"),
        ));
        let runtime = ConsortiumRuntime::new(store.clone(), clock.clone(), config);
        Self {
            store,
            clock,
            runtime,
        }
    }

    pub fn job(&self, name: &str) -> Job {
        self.store.get_as(NAMESPACE, name).expect("get job")
    }

    pub fn task(&self, job: &str, task_id: &str) -> Result<Task, consortium_kernel::KernelError> {
        self.store.get_as(NAMESPACE, &Task::object_name(job, task_id))
    }

    /// Plays the executing engine: moves a created task to `phase`.
    pub fn set_task_phase(&self, job: &str, task_id: &str, phase: TaskPhase) {
        let mut task = self.task(job, task_id).expect("task exists");
        task.status.phase = phase;
        self.store.update_as(&task).expect("update task");
    }
}

pub fn register_domain(store: &dyn ObjectStore, id: &str, role: DomainRole) {
    store
        .create_as(&Domain::new(id, role))
        .expect("register domain");
}

pub fn config(approval: bool) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.approval.enabled = approval;
    config
}

/// root -> {left, right} -> join, parties split between alice and bob.
pub fn diamond_job(name: &str, mode: ScheduleMode) -> Job {
    Job::new(
        NAMESPACE,
        name,
        JobSpec {
            initiator: "alice".to_string(),
            shape: JobShape::Dependent,
            schedule_mode: mode,
            tasks: vec![
                TaskTemplate::new("root", &["alice", "bob"]),
                TaskTemplate::new("left", &["alice"]).with_dependencies(&["root"]),
                TaskTemplate::new("right", &["bob"]).with_dependencies(&["root"]),
                TaskTemplate::new("join", &["alice", "bob"]).with_dependencies(&["left", "right"]),
            ],
            ..JobSpec::default()
        },
    )
}

/// Fails the next `conflicts` updates of `kind` as if another writer got
/// there first.
pub struct RacingStore {
    pub inner: InMemoryObjectStore,
    pub kind: ObjectKind,
    pub conflicts: AtomicU32,
}

impl RacingStore {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            inner: InMemoryObjectStore::new(),
            kind,
            conflicts: AtomicU32::new(0),
        }
    }
}

impl ObjectStore for RacingStore {
    fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<StoredObject, KernelError> {
        self.inner.get(kind, namespace, name)
    }

    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<StoredObject>, KernelError> {
        self.inner.list(kind, namespace, selector)
    }

    fn create(&self, object: StoredObject) -> Result<StoredObject, KernelError> {
        self.inner.create(object)
    }

    fn update(&self, object: StoredObject) -> Result<StoredObject, KernelError> {
        if object.kind == self.kind
            && self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(KernelError::conflict(
                object.kind,
                &object.meta.namespace,
                &object.meta.name,
                object.meta.version,
            ));
        }
        self.inner.update(object)
    }

    fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<(), KernelError> {
        self.inner.delete(kind, namespace, name)
    }
}
