//! Job submission, approval and cancellation.

use std::sync::Arc;

use tracing::info;

use consortium_kernel::{
    validate_name, ApprovePhase, Job, JobPhase, JobStage, JobStatus, KernelError, ObjectStore,
    TypedObjectStore,
};

use crate::config::RuntimeConfig;
use crate::retry::update_with_retry;

pub struct JobService {
    store: Arc<dyn ObjectStore>,
    config: RuntimeConfig,
}

impl JobService {
    pub fn new(store: Arc<dyn ObjectStore>, config: RuntimeConfig) -> Self {
        Self { store, config }
    }

    /// Stores a new job. Any status on `job` is discarded; the job starts in
    /// AwaitingApproval when approval is enabled and in Pending otherwise.
    pub fn submit(&self, mut job: Job) -> Result<Job, KernelError> {
        validate_name(&job.meta.namespace, "namespace")?;
        validate_name(&job.meta.name, "job name")?;
        if job.spec.initiator.is_empty() {
            return Err(KernelError::validation("initiator can't be empty"));
        }
        job.spec.stage = JobStage::Create;
        job.status = JobStatus {
            phase: if self.config.approval.enabled {
                JobPhase::AwaitingApproval
            } else {
                JobPhase::Pending
            },
            ..JobStatus::default()
        };
        let job = self.store.create_as(&job)?;
        info!(job = %job.meta.name, phase = ?job.phase(), "job submitted");
        Ok(job)
    }

    /// Records the decision of `domain_id` on a job awaiting approval.
    pub fn approve(
        &self,
        namespace: &str,
        name: &str,
        domain_id: &str,
        accept: bool,
    ) -> Result<Job, KernelError> {
        let decision = if accept {
            ApprovePhase::Accepted
        } else {
            ApprovePhase::Rejected
        };
        let updated = update_with_retry::<Job, _>(
            self.store.as_ref(),
            namespace,
            name,
            self.config.retry.max_attempts,
            |job| {
                if !job.participant_domains().contains(domain_id) {
                    return Err(KernelError::validation(format!(
                        "domain {domain_id} is not a participant of job {name}"
                    )));
                }
                if job.phase() != JobPhase::AwaitingApproval {
                    return Err(KernelError::validation(format!(
                        "job {name} is {:?}, not awaiting approval",
                        job.phase()
                    )));
                }
                if job.approval_of(domain_id) == decision {
                    return Ok(false);
                }
                job.status
                    .approve_status
                    .get_or_insert_with(Default::default)
                    .insert(domain_id.to_string(), decision);
                Ok(true)
            },
        )?;
        info!(job = %name, domain = %domain_id, decision = ?decision, "approval recorded");
        Ok(updated.object)
    }

    /// Requests cancellation. Terminal jobs are left alone.
    pub fn cancel(&self, namespace: &str, name: &str) -> Result<Job, KernelError> {
        let updated = update_with_retry::<Job, _>(
            self.store.as_ref(),
            namespace,
            name,
            self.config.retry.max_attempts,
            |job| {
                if job.phase().is_terminal() || job.spec.stage == JobStage::Cancel {
                    return Ok(false);
                }
                job.spec.stage = JobStage::Cancel;
                Ok(true)
            },
        )?;
        if updated.changed {
            info!(job = %name, "cancellation requested");
        }
        Ok(updated.object)
    }
}
