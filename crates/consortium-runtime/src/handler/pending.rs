use std::sync::Arc;

use tracing::{info, warn};

use consortium_kernel::{Clock, Job, JobPhase, KernelError, ObjectStore};

use crate::scheduler::{validate_job_spec, JobScheduler};

use super::{schedule_and_create, PhaseHandler};

/// Validates an approved job and dispatches its first tasks.
pub struct PendingHandler {
    store: Arc<dyn ObjectStore>,
    scheduler: JobScheduler,
    clock: Arc<dyn Clock>,
}

impl PendingHandler {
    pub fn new(store: Arc<dyn ObjectStore>, scheduler: JobScheduler, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            scheduler,
            clock,
        }
    }
}

impl PhaseHandler for PendingHandler {
    fn handle_phase(&self, job: &mut Job) -> Result<bool, KernelError> {
        if job.phase() != JobPhase::Pending {
            return Ok(false);
        }
        let now = self.clock.now();

        if let Err(e) = validate_job_spec(job) {
            warn!(job = %job.meta.name, error = %e, "job spec rejected");
            return Ok(job.transition_to(JobPhase::Failed, "ValidateFailed", e.to_string(), now));
        }

        job.status.start_time.get_or_insert(now);
        let outcome = schedule_and_create(self.store.as_ref(), &self.scheduler, job)?;
        job.status.task_status = outcome.task_status;
        job.transition_to(outcome.phase, outcome.reason, outcome.message, now);
        job.status.last_reconcile_time = Some(now);
        info!(
            job = %job.meta.name,
            phase = ?job.phase(),
            created = outcome.to_create.len(),
            "job started"
        );
        Ok(true)
    }
}
