//! Consortium kernel.
//!
//! Object model for multi-party jobs and cross-domain data grants, the shared
//! error taxonomy, and the versioned object-store contract every component
//! reads from and writes through. Reference store backends live in [store].

pub mod clock;
pub mod error;
pub mod identity;
pub mod meta;
pub mod model;
pub mod selector;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DenyReason, ErrorKind, KernelError};
pub use identity::{generate_name, validate_name};
pub use meta::{
    ObjectMeta, OwnerReference, LABEL_DOMAINDATA_VENDOR, LABEL_GRANT_DOMAIN, LABEL_JOB,
    LABEL_TASK_ID,
};
pub use model::{
    ApprovePhase, Domain, DomainData, DomainDataGrant, DomainDataGrantSpec,
    DomainDataGrantStatus, DomainDataSpec, DomainRole, DomainSpec, GrantLimit, GrantPhase, Job,
    JobPhase, JobShape, JobSpec, JobStage, JobStatus, Party, PhaseTransition, ScheduleMode, Task,
    TaskPhase, TaskSpec, TaskState, TaskStatus, TaskTemplate, UseRecord,
};
pub use selector::LabelSelector;
pub use store::{
    InMemoryObjectStore, Object, ObjectKind, ObjectStore, StoredObject, TypedObjectStore,
    WatchEvent,
};
