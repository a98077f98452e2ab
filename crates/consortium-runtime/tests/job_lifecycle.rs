mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};

use consortium_kernel::{
    Clock, FixedClock, Job, JobPhase, JobShape, JobSpec, LabelSelector, ObjectKind, ObjectStore,
    ScheduleMode, TaskPhase, TaskState, TaskTemplate, TypedObjectStore,
};
use consortium_runtime::{
    ConsortiumRuntime, ReconcileOutcome, ResyncManager, ResyncTickResult, RuntimeConfig,
};

use common::{config, diamond_job, Harness, RacingStore, NAMESPACE};

#[test]
fn approved_dag_job_runs_to_strict_failure() {
    let h = Harness::new(config(true));
    let rt = &h.runtime;
    rt.jobs
        .submit(diamond_job("job-1", ScheduleMode::Strict))
        .expect("submit");

    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Unchanged
    );

    rt.jobs.approve(NAMESPACE, "job-1", "alice", true).expect("alice");
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Unchanged
    );
    rt.jobs.approve(NAMESPACE, "job-1", "bob", true).expect("bob");
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Updated(JobPhase::Pending)
    );
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Updated(JobPhase::Running)
    );

    let job = h.job("job-1");
    assert!(job.status.start_time.is_some());
    assert_eq!(job.status.task_status.get("root"), Some(&TaskState::Pending));
    assert!(h.task("job-1", "left").expect_err("not yet").is_not_found());

    let root = h.task("job-1", "root").expect("root created");
    assert_eq!(root.meta.controller_ref().map(|r| r.name.as_str()), Some("job-1"));

    // Nothing moved: a second pass is a no-op.
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Unchanged
    );

    h.set_task_phase("job-1", "root", TaskPhase::Succeeded);
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Updated(JobPhase::Running)
    );
    h.task("job-1", "left").expect("left created");
    h.task("job-1", "right").expect("right created");

    h.set_task_phase("job-1", "left", TaskPhase::Failed);
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Updated(JobPhase::Failed)
    );
    let job = h.job("job-1");
    assert_eq!(job.status.reason, "TaskFailed");
    assert_eq!(job.status.task_status.get("join"), Some(&TaskState::Skipped));
    assert!(job.status.completion_time.is_some());
    assert!(h.task("job-1", "join").expect_err("never created").is_not_found());

    let phases: Vec<JobPhase> = job.status.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        phases,
        vec![JobPhase::Pending, JobPhase::Running, JobPhase::Failed]
    );

    // Terminal jobs stay put.
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-1").expect("reconcile"),
        ReconcileOutcome::Unchanged
    );
}

#[test]
fn best_effort_dag_fails_as_soon_as_a_branch_is_lost() {
    let mut cfg = config(false);
    cfg.scheduler.failure_tolerance = 0.5;
    let h = Harness::new(cfg);
    let rt = &h.runtime;
    rt.jobs
        .submit(diamond_job("job-2", ScheduleMode::BestEffort))
        .expect("submit");

    rt.reconciler.reconcile(NAMESPACE, "job-2").expect("start");
    h.set_task_phase("job-2", "root", TaskPhase::Succeeded);
    rt.reconciler.reconcile(NAMESPACE, "job-2").expect("unlock");
    h.clock.advance(Duration::minutes(5));
    h.set_task_phase("job-2", "left", TaskPhase::Failed);

    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-2").expect("finish"),
        ReconcileOutcome::Updated(JobPhase::Failed)
    );
    let job = h.job("job-2");
    assert_eq!(job.status.reason, "SuccessUnreachable");
    assert_eq!(job.status.completion_time, Some(h.clock.now()));
    assert_eq!(job.status.task_status.get("join"), Some(&TaskState::Skipped));
}

fn independent_job(name: &str, task_ids: &[&str]) -> Job {
    Job::new(
        NAMESPACE,
        name,
        JobSpec {
            initiator: "alice".to_string(),
            shape: JobShape::Independent,
            schedule_mode: ScheduleMode::BestEffort,
            tasks: task_ids
                .iter()
                .map(|id| TaskTemplate::new(*id, &["alice", "bob"]))
                .collect(),
            ..JobSpec::default()
        },
    )
}

#[test]
fn best_effort_job_with_a_failed_task_ends_failed_after_the_rest_finish() {
    let mut cfg = config(false);
    cfg.scheduler.failure_tolerance = 0.5;
    let h = Harness::new(cfg);
    let rt = &h.runtime;
    rt.jobs
        .submit(independent_job("job-5", &["a", "b", "c", "d"]))
        .expect("submit");
    rt.reconciler.reconcile(NAMESPACE, "job-5").expect("start");

    h.set_task_phase("job-5", "a", TaskPhase::Failed);
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-5").expect("within tolerance"),
        ReconcileOutcome::Updated(JobPhase::Running)
    );

    for id in ["b", "c", "d"] {
        h.set_task_phase("job-5", id, TaskPhase::Succeeded);
    }
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-5").expect("finish"),
        ReconcileOutcome::Updated(JobPhase::Failed)
    );
    let job = h.job("job-5");
    assert_eq!(job.status.reason, "TasksNotSucceeded");
    assert_eq!(job.status.message, "1 of 4 tasks did not succeed");
}

#[test]
fn best_effort_job_succeeds_when_every_task_succeeds() {
    let h = Harness::new(config(false));
    let rt = &h.runtime;
    rt.jobs
        .submit(independent_job("job-6", &["a", "b"]))
        .expect("submit");
    rt.reconciler.reconcile(NAMESPACE, "job-6").expect("start");
    h.set_task_phase("job-6", "a", TaskPhase::Succeeded);
    h.set_task_phase("job-6", "b", TaskPhase::Succeeded);
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-6").expect("finish"),
        ReconcileOutcome::Updated(JobPhase::Succeeded)
    );
}

#[test]
fn malformed_spec_fails_validation_without_tasks() {
    let h = Harness::new(config(false));
    let mut job = diamond_job("job-3", ScheduleMode::Strict);
    job.spec.tasks[0].dependencies = vec!["join".to_string()];
    h.runtime.jobs.submit(job).expect("submit");

    assert_eq!(
        h.runtime.reconciler.reconcile(NAMESPACE, "job-3").expect("reconcile"),
        ReconcileOutcome::Updated(JobPhase::Failed)
    );
    let job = h.job("job-3");
    assert_eq!(job.status.reason, "ValidateFailed");
    assert!(job.status.message.contains("cycle"));
    let tasks = h
        .store
        .list(ObjectKind::Task, NAMESPACE, &LabelSelector::everything())
        .expect("list");
    assert!(tasks.is_empty());
}

#[test]
fn cancel_request_moves_running_job_to_cancelled() {
    let h = Harness::new(config(false));
    let rt = &h.runtime;
    rt.jobs
        .submit(diamond_job("job-4", ScheduleMode::Strict))
        .expect("submit");
    rt.reconciler.reconcile(NAMESPACE, "job-4").expect("start");

    rt.jobs.cancel(NAMESPACE, "job-4").expect("cancel");
    assert_eq!(
        rt.reconciler.reconcile(NAMESPACE, "job-4").expect("reconcile"),
        ReconcileOutcome::Updated(JobPhase::Cancelled)
    );
    // Tasks are the executor's business.
    let root = h.task("job-4", "root").expect("root still there");
    assert_eq!(root.status.phase, TaskPhase::Pending);
}

#[test]
fn missing_job_is_gone() {
    let h = Harness::new(config(true));
    assert_eq!(
        h.runtime.reconciler.reconcile(NAMESPACE, "ghost").expect("reconcile"),
        ReconcileOutcome::Gone
    );
}

#[test]
fn resync_reconciles_live_jobs_and_skips_terminal_ones() {
    let h = Harness::new(config(false));
    let rt = &h.runtime;
    rt.jobs
        .submit(diamond_job("job-a", ScheduleMode::Strict))
        .expect("submit a");
    let mut broken = diamond_job("job-b", ScheduleMode::Strict);
    broken.spec.tasks.clear();
    rt.jobs.submit(broken).expect("submit b");
    rt.reconciler.reconcile(NAMESPACE, "job-b").expect("fail b");
    assert_eq!(h.job("job-b").phase(), JobPhase::Failed);
    let failed_version = h.job("job-b").meta.version;

    let result = rt.resync.tick(Utc::now()).expect("tick");
    assert_eq!(
        result,
        ResyncTickResult {
            scanned: 2,
            updated: 1,
            failed: 0,
        }
    );
    assert_eq!(h.job("job-a").phase(), JobPhase::Running);
    assert_eq!(h.job("job-b").meta.version, failed_version);
}

fn racing_runtime(conflicts: u32, max_attempts: u32) -> (Arc<RacingStore>, ConsortiumRuntime) {
    common::init_tracing();
    let store = Arc::new(RacingStore::new(ObjectKind::Job));
    let mut cfg = RuntimeConfig::default();
    cfg.approval.enabled = false;
    cfg.retry.max_attempts = max_attempts;
    let runtime = ConsortiumRuntime::new(
        store.clone(),
        Arc::new(FixedClock::new(Utc::now())),
        cfg,
    );
    runtime
        .jobs
        .submit(diamond_job("job-r", ScheduleMode::Strict))
        .expect("submit");
    store.conflicts.store(conflicts, Ordering::SeqCst);
    (store, runtime)
}

#[test]
fn reconciler_retries_conflicting_writes() {
    let (store, runtime) = racing_runtime(2, 5);
    assert_eq!(
        runtime.reconciler.reconcile(NAMESPACE, "job-r").expect("reconcile"),
        ReconcileOutcome::Updated(JobPhase::Running)
    );
    let job: Job = store.get_as(NAMESPACE, "job-r").expect("job");
    assert_eq!(job.phase(), JobPhase::Running);
    // Task creation was repeated on every attempt but only happened once.
    let tasks = store
        .list(ObjectKind::Task, NAMESPACE, &LabelSelector::everything())
        .expect("list");
    assert_eq!(tasks.len(), 1);
}

#[test]
fn reconciler_surfaces_conflict_after_max_attempts() {
    let (store, runtime) = racing_runtime(3, 3);
    let err = runtime
        .reconciler
        .reconcile(NAMESPACE, "job-r")
        .expect_err("conflict");
    assert!(err.is_conflict());
    let job: Job = store.get_as(NAMESPACE, "job-r").expect("job");
    assert_eq!(job.phase(), JobPhase::Pending);
}
