//! Consumption-time authorization.
//!
//! The limit check and the audit append are one versioned write: a consumer
//! that loses the race re-reads the grant and is checked again against the
//! records the winner appended.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use consortium_kernel::{
    DenyReason, DomainDataGrant, GrantLimit, GrantPhase, KernelError, ObjectStore, UseRecord,
};

use crate::retry::update_with_retry;

/// One attempt to consume granted data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UseRequest {
    /// Requesting domain.
    pub domain: String,
    pub component: String,
    pub flow_id: String,
    pub initiator: String,
    pub output: String,
}

/// Checks `request` against the limits of `grant` at `now`.
pub fn check_use(
    grant: &DomainDataGrant,
    request: &UseRequest,
    now: DateTime<Utc>,
) -> Result<(), DenyReason> {
    if let Some(limit) = &grant.spec.limit {
        check_limit(limit, grant.status.use_records.len(), request, now)?;
    }
    if request.domain != grant.spec.grant_domain {
        return Err(DenyReason::DomainMismatch {
            expected: grant.spec.grant_domain.clone(),
            actual: request.domain.clone(),
        });
    }
    Ok(())
}

fn check_limit(
    limit: &GrantLimit,
    used: usize,
    request: &UseRequest,
    now: DateTime<Utc>,
) -> Result<(), DenyReason> {
    if let Some(expired_at) = limit.expiration_time {
        if now > expired_at {
            return Err(DenyReason::Expired { expired_at });
        }
    }
    if limit.use_count > 0 && used >= limit.use_count as usize {
        return Err(DenyReason::UseCountExhausted {
            limit: limit.use_count,
        });
    }
    if !limit.components.is_empty() && !limit.components.contains(&request.component) {
        return Err(DenyReason::ComponentNotAllowed {
            component: request.component.clone(),
        });
    }
    if !limit.flow_id.is_empty() && limit.flow_id != request.flow_id {
        return Err(DenyReason::FlowMismatch {
            expected: limit.flow_id.clone(),
            actual: request.flow_id.clone(),
        });
    }
    if !limit.initiator.is_empty() && limit.initiator != request.initiator {
        return Err(DenyReason::InitiatorMismatch {
            expected: limit.initiator.clone(),
            actual: request.initiator.clone(),
        });
    }
    Ok(())
}

pub struct GrantAuthorizer {
    store: Arc<dyn ObjectStore>,
    max_attempts: u32,
}

impl GrantAuthorizer {
    pub fn new(store: Arc<dyn ObjectStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Authorizes one use of grant `namespace/grant_id` and records it.
    /// Returns the appended record.
    pub fn authorize_use(
        &self,
        namespace: &str,
        grant_id: &str,
        request: &UseRequest,
        now: DateTime<Utc>,
    ) -> Result<UseRecord, KernelError> {
        let record = UseRecord {
            use_time: now,
            grant_domain: request.domain.clone(),
            component: request.component.clone(),
            output: request.output.clone(),
        };
        let result = update_with_retry::<DomainDataGrant, _>(
            self.store.as_ref(),
            namespace,
            grant_id,
            self.max_attempts,
            |grant| {
                check_use(grant, request, now).map_err(KernelError::Denied)?;
                grant.status.use_records.push(record.clone());
                let limit = grant.spec.limit.as_ref().map_or(0, |l| l.use_count);
                if limit > 0 && grant.status.use_records.len() >= limit as usize {
                    grant.status.phase = GrantPhase::Unavailable;
                    grant.status.message = format!("all {limit} granted uses are consumed");
                }
                Ok(true)
            },
        );
        match result {
            Ok(updated) => {
                info!(
                    grant = %grant_id,
                    domain = %request.domain,
                    component = %request.component,
                    uses = updated.object.status.use_records.len(),
                    "grant use recorded"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(grant = %grant_id, domain = %request.domain, error = %e, "grant use refused");
                Err(e)
            }
        }
    }
}
