//! Phase transition log: the append-only record of every phase change a job
//! went through.
//!
//! Entries are written by [super::Job::transition_to] and persisted with the
//! job itself, so the history is exactly as consistent as the job snapshot it
//! was read from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::store::{ObjectStore, TypedObjectStore};

use super::job::{Job, JobPhase};

/// One phase change of a job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// 1-based position in the job's history.
    pub index: u64,
    pub from: JobPhase,
    pub to: JobPhase,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Reads the stored job and returns its transitions with `index >= from`.
pub fn transition_history(
    store: &dyn ObjectStore,
    namespace: &str,
    job_name: &str,
    from: u64,
) -> Result<Vec<PhaseTransition>, KernelError> {
    let job: Job = store.get_as(namespace, job_name)?;
    Ok(job
        .status
        .transitions
        .into_iter()
        .filter(|t| t.index >= from)
        .collect())
}
