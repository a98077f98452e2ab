//! One reconciliation pass over a single job.

use std::sync::Arc;

use tracing::{debug, error, info};

use consortium_kernel::{Job, JobPhase, KernelError, ObjectKind, ObjectStore};

use crate::handler::PhaseHandlerRegistry;
use crate::retry::update_with_retry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The job no longer exists.
    Gone,
    /// Nothing to persist.
    Unchanged,
    /// The job was written back; carries the phase it was left in.
    Updated(JobPhase),
}

/// Loads a job, dispatches it through the handler registry and persists the
/// result with the version it was read at. A conflicting write is retried
/// against a fresh read.
pub struct JobReconciler {
    store: Arc<dyn ObjectStore>,
    handlers: PhaseHandlerRegistry,
    max_attempts: u32,
}

impl JobReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, handlers: PhaseHandlerRegistry, max_attempts: u32) -> Self {
        Self {
            store,
            handlers,
            max_attempts,
        }
    }

    pub fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome, KernelError> {
        let result = update_with_retry::<Job, _>(
            self.store.as_ref(),
            namespace,
            name,
            self.max_attempts,
            |job| self.handlers.dispatch(job),
        );
        match result {
            Ok(updated) if updated.changed => {
                info!(
                    job = %name,
                    namespace,
                    phase = ?updated.object.phase(),
                    attempts = updated.attempts,
                    "job reconciled"
                );
                Ok(ReconcileOutcome::Updated(updated.object.phase()))
            }
            Ok(_) => Ok(ReconcileOutcome::Unchanged),
            Err(KernelError::NotFound {
                kind: ObjectKind::Job,
                ..
            }) => {
                debug!(job = %name, namespace, "job is gone");
                Ok(ReconcileOutcome::Gone)
            }
            Err(e) => {
                error!(job = %name, namespace, error = %e, "reconcile failed");
                Err(e)
            }
        }
    }
}
