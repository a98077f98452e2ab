use consortium_kernel::{Job, KernelError};

use super::PhaseHandler;

/// Succeeded, Failed, ApprovalReject and Cancelled are final.
pub struct TerminalHandler;

impl PhaseHandler for TerminalHandler {
    fn handle_phase(&self, _job: &mut Job) -> Result<bool, KernelError> {
        Ok(false)
    }
}
