use std::sync::Arc;

use tracing::{debug, info};

use consortium_kernel::{Clock, Job, JobPhase, KernelError};

use crate::approval::{ApprovalDecision, ApprovalGate};

use super::PhaseHandler;

/// Holds a job until every live participant has accepted, or moves it to
/// ApprovalReject as soon as one has rejected.
pub struct AwaitingApprovalHandler {
    gate: ApprovalGate,
    clock: Arc<dyn Clock>,
}

impl AwaitingApprovalHandler {
    pub fn new(gate: ApprovalGate, clock: Arc<dyn Clock>) -> Self {
        Self { gate, clock }
    }
}

impl PhaseHandler for AwaitingApprovalHandler {
    fn handle_phase(&self, job: &mut Job) -> Result<bool, KernelError> {
        if job.phase() != JobPhase::AwaitingApproval {
            return Ok(false);
        }
        match self.gate.evaluate(job)? {
            ApprovalDecision::Advance => {
                info!(job = %job.meta.name, "all participants accepted");
                Ok(job.transition_to(
                    JobPhase::Pending,
                    "ApprovalAccepted",
                    "all participants accepted the job",
                    self.clock.now(),
                ))
            }
            ApprovalDecision::Reject { rejected_by } => {
                info!(job = %job.meta.name, rejected_by = ?rejected_by, "job rejected");
                Ok(job.transition_to(
                    JobPhase::ApprovalReject,
                    "ApprovalRejected",
                    format!("job rejected by {}", rejected_by.join(", ")),
                    self.clock.now(),
                ))
            }
            ApprovalDecision::Wait { pending } => {
                debug!(job = %job.meta.name, pending = ?pending, "waiting for approvals");
                Ok(false)
            }
        }
    }
}
