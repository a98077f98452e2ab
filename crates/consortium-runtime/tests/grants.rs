mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};

use consortium_kernel::{
    DenyReason, DomainData, DomainDataGrant, GrantPhase, KernelError, ObjectKind,
    TypedObjectStore, LABEL_DOMAINDATA_VENDOR, LABEL_GRANT_DOMAIN,
};
use consortium_runtime::grant::api::{
    BatchQueryGrantRequest, ErrorCode, GrantLimitData, GrantRef, GrantRequest, ListGrantRequest,
};
use consortium_runtime::{GrantAuthorizer, GrantConfig, GrantService, UseRequest};

use common::{config, Harness, RacingStore};

fn harness() -> Harness {
    let h = Harness::new(config(true));
    h.store
        .create_as(&DomainData::new("alice", "table-1").with_vendor("manual"))
        .expect("seed domaindata");
    h.store
        .create_as(&DomainData::new("alice", "table-2"))
        .expect("seed domaindata");
    h
}

fn grant_request(domaindata_id: &str, grant_domain: &str) -> GrantRequest {
    GrantRequest {
        domain_id: "alice".to_string(),
        domaindata_id: domaindata_id.to_string(),
        grant_domain: grant_domain.to_string(),
        ..GrantRequest::default()
    }
}

fn create(h: &Harness, request: GrantRequest) -> String {
    let response = h.runtime.grants.create(request);
    assert!(response.status.is_success(), "{:?}", response.status);
    response.data.expect("response data").domaindatagrant_id
}

#[test]
fn create_generates_id_and_links_the_data() {
    let h = harness();
    let id = create(&h, grant_request("table-1", "bob"));
    assert!(id.starts_with("domaindatagrant-"));

    let grant: DomainDataGrant = h.store.get_as("alice", &id).expect("stored grant");
    assert_eq!(grant.spec.author, "alice");
    assert_eq!(grant.status.phase, GrantPhase::Ready);
    assert_eq!(grant.meta.labels.get(LABEL_GRANT_DOMAIN).map(String::as_str), Some("bob"));
    assert_eq!(
        grant.meta.labels.get(LABEL_DOMAINDATA_VENDOR).map(String::as_str),
        Some("manual")
    );
    let owner = grant.meta.controller_ref().expect("owner");
    assert_eq!((owner.kind, owner.name.as_str()), (ObjectKind::DomainData, "table-1"));
}

#[test]
fn create_rejects_invalid_requests() {
    let h = harness();
    let cases = [
        (grant_request("table-1", "alice"), ErrorCode::RequestValidate),
        (grant_request("table-1", ""), ErrorCode::RequestValidate),
        (grant_request("", "bob"), ErrorCode::RequestValidate),
        (grant_request("Table_1", "bob"), ErrorCode::RequestValidate),
        (grant_request("missing", "bob"), ErrorCode::NotFound),
    ];
    for (request, code) in cases {
        let response = h.runtime.grants.create(request.clone());
        assert_eq!(response.status.code, code, "{request:?}");
        assert!(response.data.is_none());
    }
    let grants: Vec<DomainDataGrant> = h
        .store
        .list_as("alice", &Default::default())
        .expect("list");
    assert!(grants.is_empty());
}

#[test]
fn create_with_taken_id_is_already_exists() {
    let h = harness();
    let mut request = grant_request("table-1", "bob");
    request.domaindatagrant_id = "grant-1".to_string();
    assert_eq!(create(&h, request.clone()), "grant-1");
    assert_eq!(
        h.runtime.grants.create(request).status.code,
        ErrorCode::AlreadyExists
    );
}

#[test]
fn update_cannot_rebind_the_data() {
    let h = harness();
    let mut request = grant_request("table-1", "bob");
    request.domaindatagrant_id = "grant-1".to_string();
    create(&h, request.clone());
    let before: DomainDataGrant = h.store.get_as("alice", "grant-1").expect("grant");

    let mut rebind = request.clone();
    rebind.domaindata_id = "table-2".to_string();
    let response = h.runtime.grants.update(rebind);
    assert_eq!(response.status.code, ErrorCode::RequestValidate);
    assert!(response.status.message.contains("can't be changed"));
    let after: DomainDataGrant = h.store.get_as("alice", "grant-1").expect("grant");
    assert_eq!(after, before);

    let mut retarget = request;
    retarget.grant_domain = "carol".to_string();
    retarget.description = "shared with carol".to_string();
    assert!(h.runtime.grants.update(retarget).status.is_success());
    let after: DomainDataGrant = h.store.get_as("alice", "grant-1").expect("grant");
    assert_eq!(after.spec.grant_domain, "carol");
    assert_eq!(after.meta.labels.get(LABEL_GRANT_DOMAIN).map(String::as_str), Some("carol"));
    assert_eq!(after.meta.owner_references.len(), 1);
    assert!(after.meta.version > before.meta.version);
}

fn racing_grants(max_attempts: u32) -> (Arc<RacingStore>, GrantService) {
    common::init_tracing();
    let store = Arc::new(RacingStore::new(ObjectKind::DomainDataGrant));
    store
        .create_as(&DomainData::new("alice", "table-1"))
        .expect("seed domaindata");
    let service = GrantService::new(store.clone(), GrantConfig::default(), max_attempts);
    let mut request = grant_request("table-1", "bob");
    request.domaindatagrant_id = "g-1".to_string();
    assert!(service.create(request).status.is_success());
    (store, service)
}

fn retarget_to_carol() -> GrantRequest {
    let mut request = grant_request("table-1", "carol");
    request.domaindatagrant_id = "g-1".to_string();
    request
}

#[test]
fn update_retries_after_a_concurrent_write() {
    let (store, service) = racing_grants(3);
    store.conflicts.store(1, Ordering::SeqCst);

    let response = service.update(retarget_to_carol());
    assert!(response.status.is_success(), "{:?}", response.status);
    let grant: DomainDataGrant = store.get_as("alice", "g-1").expect("grant");
    assert_eq!(grant.spec.grant_domain, "carol");
    assert_eq!(store.conflicts.load(Ordering::SeqCst), 0);
}

#[test]
fn update_reports_conflict_once_attempts_run_out() {
    let (store, service) = racing_grants(2);
    store.conflicts.store(2, Ordering::SeqCst);

    let response = service.update(retarget_to_carol());
    assert_eq!(response.status.code, ErrorCode::Conflict);
    let grant: DomainDataGrant = store.get_as("alice", "g-1").expect("grant");
    assert_eq!(grant.spec.grant_domain, "bob");
}

#[test]
fn query_and_delete_round_trip_through_the_envelope() {
    let h = harness();
    let mut request = grant_request("table-1", "bob");
    request.limit = Some(GrantLimitData {
        use_count: 3,
        components: vec!["psi".to_string()],
        ..GrantLimitData::default()
    });
    let id = create(&h, request);

    let queried = h.runtime.grants.query(GrantRef::new("alice", &id));
    let view = queried.data.expect("view");
    assert_eq!(view.data.domaindatagrant_id, id);
    assert_eq!(view.status.phase, "Ready");
    let limit = view.data.limit.expect("limit");
    assert_eq!(limit.use_count, 3);
    assert_eq!(limit.grant_mode, vec!["normal".to_string()]);

    assert!(h.runtime.grants.delete(GrantRef::new("alice", &id)).status.is_success());
    assert_eq!(
        h.runtime.grants.query(GrantRef::new("alice", &id)).status.code,
        ErrorCode::NotFound
    );
    assert_eq!(
        h.runtime.grants.delete(GrantRef::new("alice", &id)).status.code,
        ErrorCode::NotFound
    );
}

#[test]
fn batch_query_reports_placeholders_and_errors_in_order() {
    let h = harness();
    let id = create(&h, grant_request("table-1", "bob"));

    let response = h.runtime.grants.batch_query(BatchQueryGrantRequest {
        data: vec![
            GrantRef::new("alice", &id),
            GrantRef::new("", &id),
            GrantRef::new("alice", "missing"),
            GrantRef::new("alice", ""),
        ],
    });
    assert_eq!(response.data.len(), 4);
    assert_eq!(response.data[0].data.domaindatagrant_id, id);
    assert_eq!(response.data[1], Default::default());
    assert_eq!(response.data[3], Default::default());
    assert_eq!(response.status.code, ErrorCode::BatchQueryFailed);
    assert_eq!(
        response.status.message,
        "BatchQuery has error. Empty/Error/Total(2/1/4)"
    );
    let codes: Vec<ErrorCode> = response.status.details.iter().map(|d| d.code).collect();
    assert_eq!(
        codes,
        vec![
            ErrorCode::Success,
            ErrorCode::RequestValidate,
            ErrorCode::NotFound,
            ErrorCode::RequestValidate,
        ]
    );

    let ok = h.runtime.grants.batch_query(BatchQueryGrantRequest {
        data: vec![GrantRef::new("alice", &id)],
    });
    assert!(ok.status.is_success());
    assert!(ok.status.details.is_empty());

    // Same items, different order: the aggregate code does not move.
    let reordered = h.runtime.grants.batch_query(BatchQueryGrantRequest {
        data: vec![GrantRef::new("alice", "missing"), GrantRef::new("", &id)],
    });
    assert_eq!(reordered.status.code, ErrorCode::BatchQueryFailed);

    let empty = h.runtime.grants.batch_query(BatchQueryGrantRequest::default());
    assert_eq!(empty.status.code, ErrorCode::RequestValidate);
}

#[test]
fn list_filters_by_label_conjunction() {
    let h = harness();
    create(&h, grant_request("table-1", "bob"));
    create(&h, grant_request("table-1", "carol"));
    create(&h, grant_request("table-2", "bob"));

    let list = |grant_domain: &str, vendor: &str| {
        h.runtime
            .grants
            .list(ListGrantRequest {
                domain_id: "alice".to_string(),
                grant_domain: grant_domain.to_string(),
                domaindata_vendor: vendor.to_string(),
            })
            .data
            .len()
    };
    assert_eq!(list("", ""), 3);
    assert_eq!(list("bob", ""), 2);
    assert_eq!(list("", "manual"), 2);
    assert_eq!(list("bob", "manual"), 1);

    let missing = h.runtime.grants.list(ListGrantRequest::default());
    assert_eq!(missing.status.code, ErrorCode::RequestValidate);
}

fn bob_uses(component: &str) -> UseRequest {
    UseRequest {
        domain: "bob".to_string(),
        component: component.to_string(),
        ..UseRequest::default()
    }
}

#[test]
fn concurrent_consumers_never_exceed_the_use_count() {
    let h = harness();
    let mut request = grant_request("table-1", "bob");
    request.limit = Some(GrantLimitData {
        use_count: 2,
        ..GrantLimitData::default()
    });
    let id = create(&h, request);

    let authorizer = Arc::new(GrantAuthorizer::new(h.store.clone(), 16));
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|i| {
            let authorizer = authorizer.clone();
            let barrier = barrier.clone();
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                authorizer.authorize_use("alice", &id, &bob_uses(&format!("worker-{i}")), Utc::now())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join").expect("use within limit");
    }

    let err = authorizer
        .authorize_use("alice", &id, &bob_uses("late"), Utc::now())
        .expect_err("third use");
    assert_eq!(
        err,
        KernelError::Denied(DenyReason::UseCountExhausted { limit: 2 })
    );

    let grant: DomainDataGrant = h.store.get_as("alice", &id).expect("grant");
    assert_eq!(grant.status.use_records.len(), 2);
    assert_eq!(grant.status.phase, GrantPhase::Unavailable);
}

#[test]
fn expired_or_foreign_use_is_denied_and_not_recorded() {
    let h = harness();
    let now = Utc::now();
    let mut request = grant_request("table-1", "bob");
    request.limit = Some(GrantLimitData {
        expiration_time: (now + Duration::hours(1))
            .timestamp_nanos_opt()
            .expect("in range"),
        ..GrantLimitData::default()
    });
    let id = create(&h, request);
    let authorizer = &h.runtime.authorizer;

    let record = authorizer
        .authorize_use("alice", &id, &bob_uses("psi"), now)
        .expect("within window");
    assert_eq!(record.grant_domain, "bob");

    let err = authorizer
        .authorize_use("alice", &id, &bob_uses("psi"), now + Duration::hours(2))
        .expect_err("expired");
    assert!(matches!(err, KernelError::Denied(DenyReason::Expired { .. })));

    let mut carol = bob_uses("psi");
    carol.domain = "carol".to_string();
    let err = authorizer
        .authorize_use("alice", &id, &carol, now)
        .expect_err("not the grant domain");
    assert!(matches!(err, KernelError::Denied(DenyReason::DomainMismatch { .. })));

    let grant: DomainDataGrant = h.store.get_as("alice", &id).expect("grant");
    assert_eq!(grant.status.use_records.len(), 1);
}
