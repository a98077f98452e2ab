//! Cross-domain data grants: CRUD over grant objects and the consumption-time
//! check that enforces their limits.

pub mod api;
mod authorize;
mod service;

pub use authorize::{check_use, GrantAuthorizer, UseRequest};
pub use service::GrantService;
