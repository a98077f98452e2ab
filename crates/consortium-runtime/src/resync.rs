//! Periodic resync: re-evaluates every live job so that a lost change
//! notification only delays progress.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use consortium_kernel::{Job, KernelError, LabelSelector, ObjectStore, TypedObjectStore};

use crate::reconciler::{JobReconciler, ReconcileOutcome};

/// Result of a periodic resync tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResyncTickResult {
    /// Jobs listed in the namespace, terminal ones included.
    pub scanned: u64,
    pub updated: u64,
    pub failed: u64,
}

/// Resync abstraction; the caller owns the timer.
pub trait ResyncManager: Send + Sync {
    fn tick(&self, now: DateTime<Utc>) -> Result<ResyncTickResult, KernelError>;
}

/// Resync over all jobs of one namespace in the shared store.
pub struct StoreResyncManager {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<JobReconciler>,
    namespace: String,
}

impl StoreResyncManager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        reconciler: Arc<JobReconciler>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            reconciler,
            namespace: namespace.into(),
        }
    }
}

impl ResyncManager for StoreResyncManager {
    fn tick(&self, now: DateTime<Utc>) -> Result<ResyncTickResult, KernelError> {
        let jobs: Vec<Job> = self
            .store
            .list_as(&self.namespace, &LabelSelector::everything())?;
        let mut result = ResyncTickResult {
            scanned: jobs.len() as u64,
            ..ResyncTickResult::default()
        };
        for job in jobs.iter().filter(|j| !j.phase().is_terminal()) {
            match self.reconciler.reconcile(&self.namespace, &job.meta.name) {
                Ok(ReconcileOutcome::Updated(_)) => result.updated += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(job = %job.meta.name, error = %e, "resync of job failed");
                    result.failed += 1;
                }
            }
        }
        debug!(
            namespace = %self.namespace,
            at = %now,
            scanned = result.scanned,
            updated = result.updated,
            failed = result.failed,
            "resync tick finished"
        );
        Ok(result)
    }
}
