use std::sync::Arc;

use tracing::info;

use consortium_kernel::{Clock, Job, JobPhase, KernelError, ObjectStore};

use crate::scheduler::JobScheduler;

use super::{schedule_and_create, PhaseHandler};

/// Tracks task progress, unlocks downstream tasks and settles the job once
/// the aggregate phase turns terminal.
pub struct RunningHandler {
    store: Arc<dyn ObjectStore>,
    scheduler: JobScheduler,
    clock: Arc<dyn Clock>,
}

impl RunningHandler {
    pub fn new(store: Arc<dyn ObjectStore>, scheduler: JobScheduler, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            scheduler,
            clock,
        }
    }
}

impl PhaseHandler for RunningHandler {
    fn handle_phase(&self, job: &mut Job) -> Result<bool, KernelError> {
        if job.phase() != JobPhase::Running {
            return Ok(false);
        }
        let now = self.clock.now();
        let outcome = schedule_and_create(self.store.as_ref(), &self.scheduler, job)?;

        let mut changed = !outcome.to_create.is_empty();
        if job.status.task_status != outcome.task_status {
            job.status.task_status = outcome.task_status;
            changed = true;
        }
        if outcome.phase != JobPhase::Running
            && job.transition_to(outcome.phase, outcome.reason, outcome.message, now)
        {
            info!(job = %job.meta.name, phase = ?job.phase(), "job finished");
            changed = true;
        }
        if changed {
            job.status.last_reconcile_time = Some(now);
        }
        Ok(changed)
    }
}
