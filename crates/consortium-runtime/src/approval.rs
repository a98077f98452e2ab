//! Approval gate: decides whether a job may proceed from the per-domain
//! decisions recorded on it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use consortium_kernel::{
    ApprovePhase, Domain, Job, KernelError, ObjectStore, TypedObjectStore,
};

/// Live lookup of registered domains.
pub trait DomainRegistry: Send + Sync {
    /// `Ok(None)` when the domain is not registered; `Err` only when the
    /// lookup itself failed.
    fn resolve(&self, domain_id: &str) -> Result<Option<Domain>, KernelError>;
}

/// Registry backed by cluster-scoped [Domain] objects.
pub struct StoreDomainRegistry {
    store: Arc<dyn ObjectStore>,
}

impl StoreDomainRegistry {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl DomainRegistry for StoreDomainRegistry {
    fn resolve(&self, domain_id: &str) -> Result<Option<Domain>, KernelError> {
        match self.store.get_as::<Domain>("", domain_id) {
            Ok(domain) => Ok(Some(domain)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Every participant accepted.
    Advance,
    /// At least one participant rejected; the rest do not matter.
    Reject { rejected_by: Vec<String> },
    /// No rejection yet, but some participants have not accepted.
    Wait { pending: Vec<String> },
}

/// Pure decision over a participant set and the recorded approvals.
///
/// Entries for domains outside `participants` are ignored. An empty
/// participant set waits.
pub fn evaluate_approvals(
    participants: &BTreeSet<String>,
    approve_status: Option<&BTreeMap<String, ApprovePhase>>,
) -> ApprovalDecision {
    let phase_of = |domain: &str| {
        approve_status
            .and_then(|m| m.get(domain).copied())
            .unwrap_or_default()
    };

    let rejected_by: Vec<String> = participants
        .iter()
        .filter(|d| phase_of(d.as_str()) == ApprovePhase::Rejected)
        .cloned()
        .collect();
    if !rejected_by.is_empty() {
        return ApprovalDecision::Reject { rejected_by };
    }

    let pending: Vec<String> = participants
        .iter()
        .filter(|d| phase_of(d.as_str()) != ApprovePhase::Accepted)
        .cloned()
        .collect();
    if participants.is_empty() || !pending.is_empty() {
        return ApprovalDecision::Wait { pending };
    }
    ApprovalDecision::Advance
}

pub struct ApprovalGate {
    registry: Arc<dyn DomainRegistry>,
}

impl ApprovalGate {
    pub fn new(registry: Arc<dyn DomainRegistry>) -> Self {
        Self { registry }
    }

    /// Party domains of `job` that are currently registered.
    pub fn participants(&self, job: &Job) -> Result<BTreeSet<String>, KernelError> {
        let mut live = BTreeSet::new();
        for domain_id in job.participant_domains() {
            match self.registry.resolve(&domain_id)? {
                Some(_) => {
                    live.insert(domain_id);
                }
                None => warn!(
                    job = %job.meta.name,
                    domain = %domain_id,
                    "party domain is not registered; excluded from approval"
                ),
            }
        }
        Ok(live)
    }

    pub fn evaluate(&self, job: &Job) -> Result<ApprovalDecision, KernelError> {
        let participants = self.participants(job)?;
        Ok(evaluate_approvals(
            &participants,
            job.status.approve_status.as_ref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants(domains: &[&str]) -> BTreeSet<String> {
        domains.iter().map(|d| d.to_string()).collect()
    }

    fn approvals(entries: &[(&str, ApprovePhase)]) -> BTreeMap<String, ApprovePhase> {
        entries.iter().map(|(d, p)| (d.to_string(), *p)).collect()
    }

    #[test]
    fn rejection_dominates_pending_and_accepted() {
        let parts = participants(&["alice", "bob", "carol"]);
        let map = approvals(&[
            ("alice", ApprovePhase::Accepted),
            ("bob", ApprovePhase::Rejected),
        ]);
        assert_eq!(
            evaluate_approvals(&parts, Some(&map)),
            ApprovalDecision::Reject {
                rejected_by: vec!["bob".to_string()]
            }
        );
    }

    #[test]
    fn all_accepted_advances() {
        let parts = participants(&["alice", "bob"]);
        let map = approvals(&[
            ("alice", ApprovePhase::Accepted),
            ("bob", ApprovePhase::Accepted),
        ]);
        assert_eq!(evaluate_approvals(&parts, Some(&map)), ApprovalDecision::Advance);
    }

    #[test]
    fn absent_entries_wait() {
        let parts = participants(&["alice", "bob"]);
        let map = approvals(&[("alice", ApprovePhase::Accepted)]);
        assert_eq!(
            evaluate_approvals(&parts, Some(&map)),
            ApprovalDecision::Wait {
                pending: vec!["bob".to_string()]
            }
        );
        assert!(matches!(
            evaluate_approvals(&parts, None),
            ApprovalDecision::Wait { .. }
        ));
        assert!(matches!(
            evaluate_approvals(&parts, Some(&BTreeMap::new())),
            ApprovalDecision::Wait { .. }
        ));
    }

    #[test]
    fn stale_entries_for_departed_domains_are_ignored() {
        let parts = participants(&["alice"]);
        let map = approvals(&[
            ("alice", ApprovePhase::Accepted),
            ("mallory", ApprovePhase::Rejected),
        ]);
        assert_eq!(evaluate_approvals(&parts, Some(&map)), ApprovalDecision::Advance);
    }

    #[test]
    fn empty_participant_set_waits() {
        assert_eq!(
            evaluate_approvals(&BTreeSet::new(), None),
            ApprovalDecision::Wait { pending: vec![] }
        );
    }

    #[test]
    fn evaluation_is_idempotent() {
        let parts = participants(&["alice", "bob"]);
        let map = approvals(&[("alice", ApprovePhase::Accepted)]);
        let first = evaluate_approvals(&parts, Some(&map));
        let second = evaluate_approvals(&parts, Some(&map));
        assert_eq!(first, second);
    }
}
