//! Consortium runtime.
//!
//! Drives multi-party jobs through approval, scheduling and completion, and
//! gates cross-domain data consumption through grants. Everything reads and
//! writes through a shared [consortium_kernel::ObjectStore]; the caller owns
//! the notification loop and the resync timer.

pub mod approval;
pub mod config;
pub mod grant;
pub mod handler;
pub mod jobs;
pub mod reconciler;
pub mod resync;
pub mod retry;
pub mod scheduler;

mod runtime;

pub use approval::{
    evaluate_approvals, ApprovalDecision, ApprovalGate, DomainRegistry, StoreDomainRegistry,
};
pub use config::{
    ApprovalConfig, ConfigError, GrantConfig, ResyncConfig, RetryConfig, RuntimeConfig,
    SchedulerConfig,
};
pub use grant::{check_use, GrantAuthorizer, GrantService, UseRequest};
pub use handler::{HandlerDeps, PhaseHandler, PhaseHandlerRegistry};
pub use jobs::JobService;
pub use reconciler::{JobReconciler, ReconcileOutcome};
pub use resync::{ResyncManager, ResyncTickResult, StoreResyncManager};
pub use retry::{update_with_retry, Updated};
pub use runtime::ConsortiumRuntime;
pub use scheduler::{topological_order, validate_job_spec, JobScheduler, ScheduleOutcome};
