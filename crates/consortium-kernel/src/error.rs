//! Error taxonomy shared by the store, the phase handlers and the grant engine.
//!
//! Callers branch on [KernelError::kind] rather than on messages: a store
//! outage must never be mistaken for a missing object, and an authorization
//! denial must never be mistaken for a transport failure.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::ObjectKind;

/// Coarse error category used for retry decisions and status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or contradictory input. Never retried.
    Validation,
    /// A referenced object does not exist.
    NotFound,
    /// A create collided with an existing object.
    AlreadyExists,
    /// Optimistic-concurrency version mismatch. Retried by re-reading.
    Conflict,
    /// Backend unavailable or failing. Requeued with backoff by the driver.
    Store,
    /// Grant consumption refused. Not retried.
    Denied,
}

/// Why a grant consumption was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("grant expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
    #[error("grant use count {limit} exhausted")]
    UseCountExhausted { limit: u32 },
    #[error("component {component} is not allowed by the grant")]
    ComponentNotAllowed { component: String },
    #[error("flow {actual} does not match granted flow {expected}")]
    FlowMismatch { expected: String, actual: String },
    #[error("initiator {actual} does not match granted initiator {expected}")]
    InitiatorMismatch { expected: String, actual: String },
    #[error("domain {actual} is not the grant domain {expected}")]
    DomainMismatch { expected: String, actual: String },
}

fn object_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} {} not found", object_key(.namespace, .name))]
    NotFound {
        kind: ObjectKind,
        namespace: String,
        name: String,
    },
    #[error("{kind} {} already exists", object_key(.namespace, .name))]
    AlreadyExists {
        kind: ObjectKind,
        namespace: String,
        name: String,
    },
    #[error("version conflict on {kind} {}: expected version {expected}", object_key(.namespace, .name))]
    Conflict {
        kind: ObjectKind,
        namespace: String,
        name: String,
        expected: u64,
    },
    #[error("store error: {0}")]
    Store(String),
    #[error("authorization denied: {0}")]
    Denied(DenyReason),
}

impl KernelError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(kind: ObjectKind, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(kind: ObjectKind, namespace: &str, name: &str) -> Self {
        Self::AlreadyExists {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn conflict(kind: ObjectKind, namespace: &str, name: &str, expected: u64) -> Self {
        Self::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            expected,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Store,
            Self::Denied(_) => ErrorKind::Denied,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }
}

/// Wraps a backend failure into [KernelError::Store] and logs it.
pub fn map_driver_err(prefix: &str, e: impl std::fmt::Display) -> KernelError {
    tracing::error!(operation = prefix, error = %e, "object store failure");
    KernelError::Store(format!("{prefix}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_store_errors_are_distinct_kinds() {
        let missing = KernelError::not_found(ObjectKind::DomainData, "alice", "dd-1");
        let outage = map_driver_err("get domaindata", "connection refused");
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(outage.kind(), ErrorKind::Store);
        assert!(!outage.is_not_found());
    }

    #[test]
    fn display_omits_empty_namespace() {
        let err = KernelError::not_found(ObjectKind::Domain, "", "bob");
        assert_eq!(err.to_string(), "Domain bob not found");
        let err = KernelError::conflict(ObjectKind::Job, "cross-domain", "job-1", 4);
        assert_eq!(
            err.to_string(),
            "version conflict on Job cross-domain/job-1: expected version 4"
        );
    }
}
