//! Two domains approve a job, the executor finishes its tasks, and bob
//! consumes alice's data under a single-use grant.
//!
//! Run with:
//!   RUST_LOG=info cargo run -p consortium-runtime --example two_party_job
//!   RUST_LOG=info cargo run -p consortium-runtime --example two_party_job --features sqlite-persistence -- /tmp/consortium.db

use std::error::Error;
use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use consortium_kernel::{
    Domain, DomainData, DomainRole, JobPhase, JobShape, JobSpec, ObjectStore, SystemClock, Task,
    TaskPhase, TaskTemplate, TypedObjectStore,
};
use consortium_runtime::grant::api::{GrantLimitData, GrantRequest};
use consortium_runtime::{ConsortiumRuntime, ReconcileOutcome, RuntimeConfig, UseRequest};

#[cfg(feature = "sqlite-persistence")]
fn open_store() -> Result<Arc<dyn ObjectStore>, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(Arc::new(consortium_kernel::store::SqliteObjectStore::new(&path)?)),
        None => Ok(Arc::new(consortium_kernel::InMemoryObjectStore::new())),
    }
}

#[cfg(not(feature = "sqlite-persistence"))]
fn open_store() -> Result<Arc<dyn ObjectStore>, Box<dyn Error>> {
    Ok(Arc::new(consortium_kernel::InMemoryObjectStore::new()))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = RuntimeConfig::from_env()?;
    let namespace = config.resync.namespace.clone();
    let store = open_store()?;
    store.create_as(&Domain::new("alice", DomainRole::Local))?;
    store.create_as(&Domain::new("bob", DomainRole::Partner))?;
    store.create_as(&DomainData::new("alice", "customers").with_vendor("manual"))?;

    let rt = ConsortiumRuntime::new(store.clone(), Arc::new(SystemClock), config);

    let job = consortium_kernel::Job::new(
        namespace.as_str(),
        "psi-then-train",
        JobSpec {
            initiator: "alice".to_string(),
            shape: JobShape::Dependent,
            tasks: vec![
                TaskTemplate::new("psi", &["alice", "bob"]),
                TaskTemplate::new("train", &["alice", "bob"]).with_dependencies(&["psi"]),
            ],
            ..JobSpec::default()
        },
    );
    rt.jobs.submit(job)?;
    rt.jobs.approve(&namespace, "psi-then-train", "alice", true)?;
    rt.jobs.approve(&namespace, "psi-then-train", "bob", true)?;

    for task_id in ["psi", "train"] {
        // Drive the job until the task is dispatched, then finish it.
        while let ReconcileOutcome::Updated(phase) =
            rt.reconciler.reconcile(&namespace, "psi-then-train")?
        {
            println!("job -> {phase:?}");
        }
        let mut task: Task =
            store.get_as(&namespace, &Task::object_name("psi-then-train", task_id))?;
        task.status.phase = TaskPhase::Succeeded;
        store.update_as(&task)?;
    }
    if let ReconcileOutcome::Updated(phase) = rt.reconciler.reconcile(&namespace, "psi-then-train")? {
        println!("job -> {phase:?}");
        assert_eq!(phase, JobPhase::Succeeded);
    }

    let created = rt.grants.create(GrantRequest {
        domain_id: "alice".to_string(),
        domaindata_id: "customers".to_string(),
        grant_domain: "bob".to_string(),
        limit: Some(GrantLimitData {
            use_count: 1,
            ..GrantLimitData::default()
        }),
        ..GrantRequest::default()
    });
    let grant_id = created
        .data
        .ok_or_else(|| created.status.message.clone())?
        .domaindatagrant_id;

    let request = UseRequest {
        domain: "bob".to_string(),
        component: "train".to_string(),
        ..UseRequest::default()
    };
    for attempt in 1..=2 {
        match rt.authorizer.authorize_use("alice", &grant_id, &request, Utc::now()) {
            Ok(record) => println!("use {attempt}: granted at {}", record.use_time),
            Err(e) => println!("use {attempt}: {e}"),
        }
    }
    Ok(())
}
