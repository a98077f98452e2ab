use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;
use crate::store::{Object, ObjectKind};

pub const DEFAULT_GRANT_MODE: &str = "normal";

/// Restrictions attached to a grant. Empty / zero fields restrict nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantLimit {
    #[serde(default)]
    pub flow_id: String,
    /// Maximum number of uses; 0 means unlimited.
    #[serde(default)]
    pub use_count: u32,
    #[serde(default)]
    pub initiator: String,
    #[serde(default)]
    pub input_config: String,
    /// Components allowed to consume the data.
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub expiration_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grant_mode: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseRecord {
    pub use_time: DateTime<Utc>,
    pub grant_domain: String,
    pub component: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantPhase {
    #[default]
    Ready,
    /// The last allowed use has been recorded.
    Unavailable,
}

impl GrantPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Unavailable => "Unavailable",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDataGrantSpec {
    /// Granting domain; owns the data.
    pub author: String,
    /// Bound data id. Immutable once the grant exists.
    pub domaindata_id: String,
    /// Consuming domain; never equal to `author`.
    pub grant_domain: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub limit: Option<GrantLimit>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDataGrantStatus {
    #[serde(default)]
    pub phase: GrantPhase,
    #[serde(default)]
    pub message: String,
    /// Append-only audit trail of successful consumptions.
    #[serde(default)]
    pub use_records: Vec<UseRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDataGrant {
    pub meta: ObjectMeta,
    pub spec: DomainDataGrantSpec,
    #[serde(default)]
    pub status: DomainDataGrantStatus,
}

impl Object for DomainDataGrant {
    const KIND: ObjectKind = ObjectKind::DomainDataGrant;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
