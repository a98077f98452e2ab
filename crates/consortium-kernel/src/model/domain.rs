use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;
use crate::store::{Object, ObjectKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainRole {
    /// Administered by this deployment.
    #[default]
    Local,
    /// Registered counterpart administered elsewhere.
    Partner,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSpec {
    #[serde(default)]
    pub role: DomainRole,
    #[serde(default)]
    pub cert: Option<String>,
}

/// Registered trust domain. Cluster scoped: the namespace is empty and the
/// name is the domain id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: DomainSpec,
}

impl Domain {
    pub fn new(domain_id: impl Into<String>, role: DomainRole) -> Self {
        Self {
            meta: ObjectMeta::new("", domain_id),
            spec: DomainSpec { role, cert: None },
        }
    }
}

impl Object for Domain {
    const KIND: ObjectKind = ObjectKind::Domain;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDataSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub relative_uri: String,
    #[serde(default)]
    pub datasource_id: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A protected data resource, stored in the namespace of its owning domain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainData {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: DomainDataSpec,
}

impl DomainData {
    pub fn new(owner_domain: impl Into<String>, domaindata_id: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(owner_domain, domaindata_id),
            spec: DomainDataSpec::default(),
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.spec.vendor = vendor.into();
        self
    }
}

impl Object for DomainData {
    const KIND: ObjectKind = ObjectKind::DomainData;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
