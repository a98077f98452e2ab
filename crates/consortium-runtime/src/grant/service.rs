//! Grant CRUD.

use std::sync::Arc;

use tracing::{error, info, warn};

use consortium_kernel::{
    generate_name, validate_name, DomainData, DomainDataGrant, DomainDataGrantSpec,
    DomainDataGrantStatus, KernelError, LabelSelector, ObjectKind, ObjectMeta, ObjectStore,
    TypedObjectStore, LABEL_DOMAINDATA_VENDOR, LABEL_GRANT_DOMAIN,
};

use crate::config::GrantConfig;
use crate::retry::update_with_retry;

use super::api::{
    ApiStatus, BatchQueryGrantRequest, BatchQueryGrantResponse, CreateGrantRequest,
    CreateGrantResponse, CreateGrantResponseData, DeleteGrantRequest, DeleteGrantResponse,
    ErrorCode, GrantRef, GrantRequest, GrantView, ListGrantRequest, ListGrantResponse,
    QueryGrantRequest, QueryGrantResponse, UpdateGrantRequest, UpdateGrantResponse,
};

pub struct GrantService {
    store: Arc<dyn ObjectStore>,
    config: GrantConfig,
    max_attempts: u32,
}

impl GrantService {
    /// `max_attempts` bounds the re-read loop when an update races another
    /// writer.
    pub fn new(store: Arc<dyn ObjectStore>, config: GrantConfig, max_attempts: u32) -> Self {
        Self {
            store,
            config,
            max_attempts,
        }
    }

    pub fn create(&self, request: CreateGrantRequest) -> CreateGrantResponse {
        match self.create_grant(request) {
            Ok(id) => CreateGrantResponse {
                status: ApiStatus::success(),
                data: Some(CreateGrantResponseData {
                    domaindatagrant_id: id,
                }),
            },
            Err(e) => {
                error!(error = %e, "create grant failed");
                CreateGrantResponse {
                    status: ApiStatus::from(&e),
                    data: None,
                }
            }
        }
    }

    pub fn query(&self, request: QueryGrantRequest) -> QueryGrantResponse {
        match self.load(&request) {
            Ok(grant) => QueryGrantResponse {
                status: ApiStatus::success(),
                data: Some(GrantView::from(&grant)),
            },
            Err(e) => {
                error!(error = %e, "query grant failed");
                QueryGrantResponse {
                    status: ApiStatus::from(&e),
                    data: None,
                }
            }
        }
    }

    pub fn update(&self, request: UpdateGrantRequest) -> UpdateGrantResponse {
        let status = match self.update_grant(request) {
            Ok(()) => ApiStatus::success(),
            Err(e) => {
                error!(error = %e, "update grant failed");
                ApiStatus::from(&e)
            }
        };
        UpdateGrantResponse { status }
    }

    pub fn delete(&self, request: DeleteGrantRequest) -> DeleteGrantResponse {
        warn!(
            domain = %request.domain_id,
            grant = %request.domaindatagrant_id,
            "deleting grant"
        );
        let status = match self
            .store
            .delete_as::<DomainDataGrant>(&request.domain_id, &request.domaindatagrant_id)
        {
            Ok(()) => ApiStatus::success(),
            Err(e) => {
                error!(error = %e, "delete grant failed");
                ApiStatus::from(&e)
            }
        };
        DeleteGrantResponse { status }
    }

    /// Queries every item independently. Malformed items yield an empty
    /// placeholder; the aggregate status is an error if any item failed.
    pub fn batch_query(&self, request: BatchQueryGrantRequest) -> BatchQueryGrantResponse {
        if request.data.is_empty() {
            return BatchQueryGrantResponse {
                status: ApiStatus::error(
                    ErrorCode::RequestValidate,
                    "batch query data can't be empty",
                ),
                data: Vec::new(),
            };
        }

        let total = request.data.len();
        let mut empty = 0;
        let mut failed = 0;
        let mut data = Vec::with_capacity(total);
        let mut details = Vec::with_capacity(total);
        for item in request.data {
            if item.domain_id.is_empty() || item.domaindatagrant_id.is_empty() {
                empty += 1;
                data.push(GrantView::default());
                details.push(ApiStatus::error(
                    ErrorCode::RequestValidate,
                    "domain_id and domaindatagrant_id can't be empty",
                ));
                continue;
            }
            let response = self.query(item);
            if !response.status.is_success() {
                failed += 1;
            }
            data.push(response.data.unwrap_or_default());
            details.push(response.status);
        }

        if empty == 0 && failed == 0 {
            return BatchQueryGrantResponse {
                status: ApiStatus::success(),
                data,
            };
        }
        let mut status = ApiStatus::error(
            ErrorCode::BatchQueryFailed,
            format!("BatchQuery has error. Empty/Error/Total({empty}/{failed}/{total})"),
        );
        status.details = details;
        BatchQueryGrantResponse { status, data }
    }

    /// Grants authored by `domain_id`, optionally narrowed by grant domain
    /// and data vendor.
    pub fn list(&self, request: ListGrantRequest) -> ListGrantResponse {
        if request.domain_id.is_empty() {
            return ListGrantResponse {
                status: ApiStatus::error(ErrorCode::RequestValidate, "domain_id can't be empty"),
                data: Vec::new(),
            };
        }
        let mut selector = LabelSelector::everything();
        if !request.domaindata_vendor.is_empty() {
            selector = selector.and(LabelSelector::eq(
                LABEL_DOMAINDATA_VENDOR,
                request.domaindata_vendor,
            ));
        }
        if !request.grant_domain.is_empty() {
            selector = selector.and(LabelSelector::eq(LABEL_GRANT_DOMAIN, request.grant_domain));
        }
        match self
            .store
            .list_as::<DomainDataGrant>(&request.domain_id, &selector)
        {
            Ok(grants) => ListGrantResponse {
                status: ApiStatus::success(),
                data: grants.iter().map(GrantView::from).collect(),
            },
            Err(e) => {
                error!(error = %e, selector = %selector, "list grants failed");
                ListGrantResponse {
                    status: ApiStatus::from(&e),
                    data: Vec::new(),
                }
            }
        }
    }

    fn load(&self, grant: &GrantRef) -> Result<DomainDataGrant, KernelError> {
        self.store
            .get_as(&grant.domain_id, &grant.domaindatagrant_id)
    }

    fn create_grant(&self, request: GrantRequest) -> Result<String, KernelError> {
        validate_create(&request)?;
        let data: DomainData = self
            .store
            .get_as(&request.domain_id, &request.domaindata_id)?;

        let id = if request.domaindatagrant_id.is_empty() {
            generate_name(&self.config.id_prefix)
        } else {
            match self
                .store
                .get(ObjectKind::DomainDataGrant, &request.domain_id, &request.domaindatagrant_id)
            {
                Ok(_) => {
                    return Err(KernelError::already_exists(
                        ObjectKind::DomainDataGrant,
                        &request.domain_id,
                        &request.domaindatagrant_id,
                    ))
                }
                Err(e) if e.is_not_found() => request.domaindatagrant_id.clone(),
                Err(e) => return Err(e),
            }
        };

        let mut grant = DomainDataGrant {
            meta: ObjectMeta::new(request.domain_id.clone(), id),
            spec: DomainDataGrantSpec::default(),
            status: DomainDataGrantStatus::default(),
        };
        self.apply_request(&mut grant, &data, request);
        let grant = self.store.create_as(&grant)?;
        info!(
            grant = %grant.meta.name,
            author = %grant.spec.author,
            grant_domain = %grant.spec.grant_domain,
            "grant created"
        );
        Ok(grant.meta.name)
    }

    fn update_grant(&self, request: GrantRequest) -> Result<(), KernelError> {
        if request.domaindata_id.is_empty() {
            return Err(KernelError::validation("domaindata_id can't be empty"));
        }
        let data: DomainData = self
            .store
            .get_as(&request.domain_id, &request.domaindata_id)?;
        if request.grant_domain.is_empty() {
            return Err(KernelError::validation("grant_domain can't be empty"));
        }
        if request.grant_domain == request.domain_id {
            return Err(KernelError::validation(
                "grant_domain can't be the granting domain",
            ));
        }
        if request.domaindatagrant_id.is_empty() {
            return Err(KernelError::validation("domaindatagrant_id can't be empty"));
        }

        let namespace = request.domain_id.clone();
        let name = request.domaindatagrant_id.clone();
        let updated = update_with_retry(
            self.store.as_ref(),
            &namespace,
            &name,
            self.max_attempts,
            |grant: &mut DomainDataGrant| {
                if grant.spec.domaindata_id != request.domaindata_id {
                    return Err(KernelError::validation("domaindata_id can't be changed"));
                }
                self.apply_request(grant, &data, request.clone());
                Ok(true)
            },
        )?;
        let grant = updated.object;
        info!(grant = %grant.meta.name, version = grant.meta.version, "grant updated");
        Ok(())
    }

    /// Writes the request fields into `grant` and (re)attaches its labels and
    /// the controller reference to `data`.
    fn apply_request(&self, grant: &mut DomainDataGrant, data: &DomainData, request: GrantRequest) {
        let default_mode = self.config.default_grant_mode.as_str();
        grant.spec = DomainDataGrantSpec {
            author: request.domain_id,
            domaindata_id: request.domaindata_id,
            grant_domain: request.grant_domain,
            signature: request.signature,
            description: request.description,
            limit: request.limit.map(|l| l.into_limit(default_mode)),
        };
        let meta = &mut grant.meta;
        meta.labels
            .insert(LABEL_GRANT_DOMAIN.to_string(), grant.spec.grant_domain.clone());
        if !data.spec.vendor.is_empty() {
            meta.labels
                .insert(LABEL_DOMAINDATA_VENDOR.to_string(), data.spec.vendor.clone());
        }
        meta.set_controller_ref(ObjectKind::DomainData, &data.meta.name);
    }
}

fn validate_create(request: &GrantRequest) -> Result<(), KernelError> {
    if request.grant_domain.is_empty() {
        return Err(KernelError::validation("grant_domain can't be empty"));
    }
    if request.grant_domain == request.domain_id {
        return Err(KernelError::validation(
            "grant_domain can't be the granting domain",
        ));
    }
    if request.domaindata_id.is_empty() {
        return Err(KernelError::validation("domaindata_id can't be empty"));
    }
    validate_name(&request.domain_id, "domain_id")?;
    validate_name(&request.domaindata_id, "domaindata_id")?;
    if !request.domaindatagrant_id.is_empty() {
        validate_name(&request.domaindatagrant_id, "domaindatagrant_id")?;
    }
    Ok(())
}
