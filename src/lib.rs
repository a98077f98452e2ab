//! Consortium: multi-party job orchestration and cross-domain data grants.
//!
//! - [kernel]: object model, errors and the versioned object-store contract.
//! - [runtime]: approval gate, scheduler, phase handlers, reconciler, resync
//!   and the grant engine.

pub use consortium_kernel as kernel;
pub use consortium_runtime as runtime;

pub use consortium_kernel::{KernelError, ObjectStore};
pub use consortium_runtime::{ConsortiumRuntime, RuntimeConfig};
