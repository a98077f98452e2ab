//! Request and response types of the grant CRUD API.
//!
//! Every response carries an [ApiStatus] envelope. Timestamps cross this
//! boundary as Unix nanoseconds, with 0 meaning unset.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use consortium_kernel::{
    DomainDataGrant, ErrorKind, GrantLimit, KernelError, UseRecord,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCode {
    #[default]
    Success,
    RequestValidate,
    NotFound,
    AlreadyExists,
    Conflict,
    StoreUnavailable,
    PermissionDenied,
    /// Aggregate status of a batch query with at least one bad item; the
    /// per-item codes are in `details`.
    BatchQueryFailed,
}

impl ErrorCode {
    /// Numeric code on the wire; 0 is success.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::RequestValidate => 11100,
            Self::NotFound => 11101,
            Self::AlreadyExists => 11102,
            Self::Conflict => 11103,
            Self::StoreUnavailable => 11104,
            Self::PermissionDenied => 11105,
            Self::BatchQueryFailed => 11106,
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => Self::RequestValidate,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::AlreadyExists => Self::AlreadyExists,
            ErrorKind::Conflict => Self::Conflict,
            ErrorKind::Store => Self::StoreUnavailable,
            ErrorKind::Denied => Self::PermissionDenied,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiStatus {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
    /// Per-item statuses of a batch call, in request order.
    #[serde(default)]
    pub details: Vec<ApiStatus>,
}

impl ApiStatus {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success
    }
}

impl From<&KernelError> for ApiStatus {
    fn from(e: &KernelError) -> Self {
        Self::error(e.kind().into(), e.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrantLimitData {
    #[serde(default)]
    pub flow_id: String,
    /// 0 is unlimited.
    #[serde(default)]
    pub use_count: u32,
    #[serde(default)]
    pub initiator: String,
    #[serde(default)]
    pub input_config: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub expiration_time: i64,
    /// Empty means the configured default mode.
    #[serde(default)]
    pub grant_mode: Vec<String>,
}

impl GrantLimitData {
    pub(crate) fn into_limit(self, default_grant_mode: &str) -> GrantLimit {
        let grant_mode = if self.grant_mode.is_empty() {
            vec![default_grant_mode.to_string()]
        } else {
            self.grant_mode
        };
        GrantLimit {
            flow_id: self.flow_id,
            use_count: self.use_count,
            initiator: self.initiator,
            input_config: self.input_config,
            components: self.components,
            expiration_time: from_unix_nanos(self.expiration_time),
            grant_mode,
        }
    }
}

impl From<&GrantLimit> for GrantLimitData {
    fn from(limit: &GrantLimit) -> Self {
        Self {
            flow_id: limit.flow_id.clone(),
            use_count: limit.use_count,
            initiator: limit.initiator.clone(),
            input_config: limit.input_config.clone(),
            components: limit.components.clone(),
            expiration_time: limit.expiration_time.map(to_unix_nanos).unwrap_or(0),
            grant_mode: limit.grant_mode.clone(),
        }
    }
}

/// Body shared by create and update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrantRequest {
    /// Granting domain; also the namespace the grant is stored in.
    pub domain_id: String,
    pub domaindata_id: String,
    /// Generated on create when empty.
    #[serde(default)]
    pub domaindatagrant_id: String,
    pub grant_domain: String,
    #[serde(default)]
    pub limit: Option<GrantLimitData>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signature: String,
}

pub type CreateGrantRequest = GrantRequest;
pub type UpdateGrantRequest = GrantRequest;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreateGrantResponseData {
    pub domaindatagrant_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreateGrantResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub data: Option<CreateGrantResponseData>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateGrantResponse {
    pub status: ApiStatus,
}

/// Addresses one grant; used by query, delete and batch query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrantRef {
    pub domain_id: String,
    pub domaindatagrant_id: String,
}

impl GrantRef {
    pub fn new(domain_id: impl Into<String>, domaindatagrant_id: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            domaindatagrant_id: domaindatagrant_id.into(),
        }
    }
}

pub type QueryGrantRequest = GrantRef;
pub type DeleteGrantRequest = GrantRef;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrantData {
    pub domaindatagrant_id: String,
    pub author: String,
    pub domaindata_id: String,
    pub grant_domain: String,
    #[serde(default)]
    pub limit: Option<GrantLimitData>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UseRecordData {
    pub use_time: i64,
    pub grant_domain: String,
    pub component: String,
    #[serde(default)]
    pub output: String,
}

impl From<&UseRecord> for UseRecordData {
    fn from(record: &UseRecord) -> Self {
        Self {
            use_time: to_unix_nanos(record.use_time),
            grant_domain: record.grant_domain.clone(),
            component: record.component.clone(),
            output: record.output.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrantStatusData {
    pub phase: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub records: Vec<UseRecordData>,
}

/// A grant as returned by query and list. The default value is the empty
/// placeholder of a malformed batch item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrantView {
    pub data: GrantData,
    pub status: GrantStatusData,
}

impl From<&DomainDataGrant> for GrantView {
    fn from(grant: &DomainDataGrant) -> Self {
        Self {
            data: GrantData {
                domaindatagrant_id: grant.meta.name.clone(),
                author: grant.spec.author.clone(),
                domaindata_id: grant.spec.domaindata_id.clone(),
                grant_domain: grant.spec.grant_domain.clone(),
                limit: grant.spec.limit.as_ref().map(GrantLimitData::from),
                description: grant.spec.description.clone(),
                signature: grant.spec.signature.clone(),
            },
            status: GrantStatusData {
                phase: grant.status.phase.as_str().to_string(),
                message: grant.status.message.clone(),
                records: grant.status.use_records.iter().map(UseRecordData::from).collect(),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueryGrantResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub data: Option<GrantView>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeleteGrantResponse {
    pub status: ApiStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchQueryGrantRequest {
    pub data: Vec<GrantRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchQueryGrantResponse {
    pub status: ApiStatus,
    /// One entry per request item, in request order.
    pub data: Vec<GrantView>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ListGrantRequest {
    pub domain_id: String,
    #[serde(default)]
    pub grant_domain: String,
    #[serde(default)]
    pub domaindata_vendor: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ListGrantResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub data: Vec<GrantView>,
}

pub(crate) fn to_unix_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(crate) fn from_unix_nanos(nanos: i64) -> Option<DateTime<Utc>> {
    (nanos > 0).then(|| DateTime::from_timestamp_nanos(nanos))
}
