use std::sync::Arc;

use consortium_kernel::{Clock, ObjectStore};

use crate::approval::{DomainRegistry, StoreDomainRegistry};
use crate::config::RuntimeConfig;
use crate::grant::{GrantAuthorizer, GrantService};
use crate::handler::{HandlerDeps, PhaseHandlerRegistry};
use crate::jobs::JobService;
use crate::reconciler::JobReconciler;
use crate::resync::StoreResyncManager;

/// Every component wired over one store, clock and config.
pub struct ConsortiumRuntime {
    pub jobs: JobService,
    pub reconciler: Arc<JobReconciler>,
    pub resync: StoreResyncManager,
    pub grants: GrantService,
    pub authorizer: GrantAuthorizer,
}

impl ConsortiumRuntime {
    /// Uses the store's Domain objects as the domain registry.
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>, config: RuntimeConfig) -> Self {
        let registry = Arc::new(StoreDomainRegistry::new(store.clone()));
        Self::with_registry(store, registry, clock, config)
    }

    pub fn with_registry(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn DomainRegistry>,
        clock: Arc<dyn Clock>,
        config: RuntimeConfig,
    ) -> Self {
        let deps = HandlerDeps {
            store: store.clone(),
            registry,
            clock,
            config: config.clone(),
        };
        let reconciler = Arc::new(JobReconciler::new(
            store.clone(),
            PhaseHandlerRegistry::with_defaults(&deps),
            config.retry.max_attempts,
        ));
        Self {
            jobs: JobService::new(store.clone(), config.clone()),
            resync: StoreResyncManager::new(
                store.clone(),
                reconciler.clone(),
                config.resync.namespace.clone(),
            ),
            reconciler,
            grants: GrantService::new(
                store.clone(),
                config.grant.clone(),
                config.retry.max_attempts,
            ),
            authorizer: GrantAuthorizer::new(store, config.retry.max_attempts),
        }
    }
}
