//! Per-phase job handlers and the registry that dispatches to them.
//!
//! A handler receives the current job snapshot, mutates it in place and
//! reports whether the caller has to persist it. Handlers keep no state of
//! their own between calls.

mod awaiting_approval;
mod pending;
mod running;
mod terminal;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use consortium_kernel::{
    Clock, Job, JobPhase, JobStage, KernelError, LabelSelector, ObjectKind, ObjectStore, Task,
    TypedObjectStore, LABEL_JOB,
};

use crate::approval::{ApprovalGate, DomainRegistry};
use crate::config::RuntimeConfig;
use crate::scheduler::{JobScheduler, ScheduleOutcome};

pub use awaiting_approval::AwaitingApprovalHandler;
pub use pending::PendingHandler;
pub use running::RunningHandler;
pub use terminal::TerminalHandler;

pub trait PhaseHandler: Send + Sync {
    /// Advances `job` as far as its current phase allows. `Ok(true)` means the
    /// job was mutated and must be written back.
    fn handle_phase(&self, job: &mut Job) -> Result<bool, KernelError>;
}

/// Collaborators shared by the built-in handlers.
#[derive(Clone)]
pub struct HandlerDeps {
    pub store: Arc<dyn ObjectStore>,
    pub registry: Arc<dyn DomainRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: RuntimeConfig,
}

pub struct PhaseHandlerRegistry {
    handlers: HashMap<JobPhase, Box<dyn PhaseHandler>>,
    clock: Arc<dyn Clock>,
}

impl PhaseHandlerRegistry {
    /// Empty registry; phases without a handler fail dispatch.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            handlers: HashMap::new(),
            clock,
        }
    }

    /// Registry with a handler for every phase.
    pub fn with_defaults(deps: &HandlerDeps) -> Self {
        let mut registry = Self::new(deps.clock.clone());
        registry.register(
            JobPhase::AwaitingApproval,
            AwaitingApprovalHandler::new(ApprovalGate::new(deps.registry.clone()), deps.clock.clone()),
        );
        registry.register(
            JobPhase::Pending,
            PendingHandler::new(
                deps.store.clone(),
                JobScheduler::new(deps.config.scheduler.clone()),
                deps.clock.clone(),
            ),
        );
        registry.register(
            JobPhase::Running,
            RunningHandler::new(
                deps.store.clone(),
                JobScheduler::new(deps.config.scheduler.clone()),
                deps.clock.clone(),
            ),
        );
        for phase in JobPhase::ALL.into_iter().filter(JobPhase::is_terminal) {
            registry.register(phase, TerminalHandler);
        }
        registry
    }

    /// Installs `handler` for `phase`, replacing any previous one.
    pub fn register(&mut self, phase: JobPhase, handler: impl PhaseHandler + 'static) {
        self.handlers.insert(phase, Box::new(handler));
    }

    /// Applies a pending cancellation, otherwise runs the handler for the
    /// job's current phase.
    pub fn dispatch(&self, job: &mut Job) -> Result<bool, KernelError> {
        let phase = job.phase();
        if job.spec.stage == JobStage::Cancel && !phase.is_terminal() {
            let cancelled = job.transition_to(
                JobPhase::Cancelled,
                "JobCancelled",
                "job was cancelled on request",
                self.clock.now(),
            );
            if cancelled {
                info!(job = %job.meta.name, from = ?phase, "job cancelled");
            }
            return Ok(cancelled);
        }
        let handler = self.handlers.get(&phase).ok_or_else(|| {
            KernelError::validation(format!("no handler registered for phase {phase:?}"))
        })?;
        debug!(job = %job.meta.name, phase = ?phase, "dispatching phase handler");
        handler.handle_phase(job)
    }
}

/// Lists the tasks owned by `job`, runs the scheduler over them and creates
/// whatever it found eligible. Creating a task that already exists counts as
/// success.
pub(crate) fn schedule_and_create(
    store: &dyn ObjectStore,
    scheduler: &JobScheduler,
    job: &Job,
) -> Result<ScheduleOutcome, KernelError> {
    let selector = LabelSelector::eq(LABEL_JOB, job.meta.name.clone());
    let tasks: Vec<Task> = store.list_as(&job.meta.namespace, &selector)?;
    let outcome = scheduler.schedule(job, &tasks);

    for task_id in &outcome.to_create {
        let Some(template) = job.task(task_id) else {
            continue;
        };
        match store.create_as(&Task::from_template(job, template)) {
            Ok(_) => info!(job = %job.meta.name, task = %task_id, "task created"),
            Err(KernelError::AlreadyExists {
                kind: ObjectKind::Task,
                ..
            }) => debug!(job = %job.meta.name, task = %task_id, "task already exists"),
            Err(e) => return Err(e),
        }
    }
    Ok(outcome)
}
