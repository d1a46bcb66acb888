//! Service wiring.

use std::sync::Arc;

use tracing::info;

use reportgate_gateway::{build_provider, PaymentProvider, RetryPolicy};
use reportgate_store::{CacheStore, ReportStore};

use crate::config::{CacheBackendKind, ReportGateConfig};
use crate::entitlement::ReportEntitlementGate;
use crate::error::{OpsError, OpsResult};
use crate::gateway_client::GatewayClient;
use crate::ledger::InvoiceLedger;
use crate::lookup::LookupService;
use crate::reconciliation::ReconciliationService;

/// Every service, sharing one store and one provider.
#[derive(Debug, Clone)]
pub struct Services {
    /// Invoice ledger and audit log
    pub ledger: Arc<InvoiceLedger>,
    /// Audited provider access
    pub gateway: Arc<GatewayClient>,
    /// Payment start and confirmation
    pub reconciliation: Arc<ReconciliationService>,
    /// Report grants
    pub entitlements: Arc<ReportEntitlementGate>,
    /// Cached lookup data
    pub lookup: Arc<LookupService>,
    /// The cache behind `lookup`
    pub cache: Arc<CacheStore>,
}

impl Services {
    /// Open the store and build the configured provider.
    pub fn from_config(config: &ReportGateConfig) -> OpsResult<Self> {
        config.validate()?;

        let store_config = config.storage.store_config();
        let database = store_config.database_path();
        let store = ReportStore::open(store_config)
            .map_err(|e| OpsError::persistence(format!("open {}", database.display()), e))?;
        let provider = build_provider(&config.gateway, config.timeouts.gateway)
            .map_err(|e| OpsError::config(e.to_string()))?;

        info!(
            database = %database.display(),
            provider = provider.name(),
            cache = ?config.cache.backend,
            "Services ready"
        );
        Ok(Self::with_provider(&store, provider, config))
    }

    /// Wire the services over an open store and a given provider.
    pub fn with_provider(
        store: &ReportStore,
        provider: Arc<dyn PaymentProvider>,
        config: &ReportGateConfig,
    ) -> Self {
        let store_timeout = config.timeouts.store;

        let ledger = Arc::new(InvoiceLedger::from_store(store, store_timeout));
        let gateway = Arc::new(GatewayClient::new(
            provider,
            Arc::clone(&ledger),
            config.timeouts.gateway,
        ));
        let entitlements = Arc::new(ReportEntitlementGate::from_store(
            store,
            config.reports.retention_days,
            store_timeout,
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            Arc::clone(&ledger),
            Arc::clone(&gateway),
            Arc::clone(&entitlements),
            RetryPolicy::from_config(&config.retry),
        ));

        let cache = Arc::new(match config.cache.backend {
            CacheBackendKind::Memory => CacheStore::in_memory(),
            CacheBackendKind::Sqlite => CacheStore::new(store.cache_backend.clone()),
        });
        let lookup = Arc::new(LookupService::from_store(
            store,
            Arc::clone(&cache),
            config.cache.ttl,
            store_timeout,
        ));

        Self {
            ledger,
            gateway,
            reconciliation,
            entitlements,
            lookup,
            cache,
        }
    }
}
