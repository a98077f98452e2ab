//! Stored object kinds.

mod domain;
mod grant;
mod job;
mod task;
mod transition;

pub use domain::{Domain, DomainData, DomainDataSpec, DomainRole, DomainSpec};
pub use grant::{
    DomainDataGrant, DomainDataGrantSpec, DomainDataGrantStatus, GrantLimit, GrantPhase,
    UseRecord, DEFAULT_GRANT_MODE,
};
pub use job::{
    ApprovePhase, Job, JobPhase, JobShape, JobSpec, JobStage, JobStatus, Party, ScheduleMode,
    TaskState, TaskTemplate,
};
pub use task::{Task, TaskPhase, TaskSpec, TaskStatus};
pub use transition::{transition_history, PhaseTransition};
