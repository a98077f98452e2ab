//! Object metadata carried by every stored object.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::ObjectKind;

/// Job that owns a task.
pub const LABEL_JOB: &str = "consortium.io/job";
/// Task id of a task within its job.
pub const LABEL_TASK_ID: &str = "consortium.io/task-id";
/// Consuming domain of a grant.
pub const LABEL_GRANT_DOMAIN: &str = "consortium.io/grant-domain";
/// Vendor of the data a grant protects.
pub const LABEL_DOMAINDATA_VENDOR: &str = "consortium.io/domaindata-vendor";

/// Reference from a dependent object to the object that owns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: ObjectKind,
    pub name: String,
    pub controller: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    /// Empty for cluster-scoped kinds such as domains.
    #[serde(default)]
    pub namespace: String,
    /// Assigned by the store; every write must carry the version it read.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Attaches a controller reference to `kind/name` unless an identical one
    /// is already present.
    pub fn set_controller_ref(&mut self, kind: ObjectKind, name: &str) {
        let exists = self
            .owner_references
            .iter()
            .any(|r| r.controller && r.kind == kind && r.name == name);
        if !exists {
            self.owner_references.push(OwnerReference {
                kind,
                name: name.to_string(),
                controller: true,
            });
        }
    }

    pub fn controller_ref(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_ref_is_attached_once() {
        let mut meta = ObjectMeta::new("alice", "grant-1");
        meta.set_controller_ref(ObjectKind::DomainData, "dd-1");
        meta.set_controller_ref(ObjectKind::DomainData, "dd-1");
        assert_eq!(meta.owner_references.len(), 1);
        let owner = meta.controller_ref().expect("controller ref");
        assert_eq!(owner.kind, ObjectKind::DomainData);
        assert_eq!(owner.name, "dd-1");
    }
}
