//! Helper functions for creating test fixtures.
//!
//! Provides a configuration tuned for fast tests and pre-wired `Services`
//! over a temporary SQLite database and a [`MockProvider`].

use reportgate_ops::{CacheBackendKind, ReportGateConfig, Services};
use reportgate_store::{ReportStore, ReportStoreConfig};
use reportgate_types::{Amount, GatewayRef, InvoiceRef};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::MockProvider;

/// Configuration rooted at `dir` with short deadlines and retry delays.
pub fn test_config(dir: &TempDir) -> ReportGateConfig {
    let mut config = ReportGateConfig::default();
    config.storage.base_dir = dir.path().to_path_buf();
    config.timeouts.gateway = Duration::from_millis(500);
    config.timeouts.store = Duration::from_secs(5);
    config.cache.backend = CacheBackendKind::Sqlite;
    config.retry.max_attempts = 3;
    config.retry.base_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.gateway.paystack.secret_key = "sk_test_mock".to_string();
    config
}

/// Create services over a fresh database and a default [`MockProvider`].
///
/// Returns the services, the mock (for scripting and assertions), and the
/// temp directory (must be kept alive for the duration of the test).
pub fn create_test_services() -> (Services, MockProvider, TempDir) {
    create_test_services_with(MockProvider::new(), |_| {})
}

/// Create services with a given mock and configuration tweaks.
pub fn create_test_services_with(
    mock: MockProvider,
    configure: impl FnOnce(&mut ReportGateConfig),
) -> (Services, MockProvider, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    configure(&mut config);

    let store = ReportStore::open(ReportStoreConfig::new(temp_dir.path())).unwrap();
    let services = Services::with_provider(&store, Arc::new(mock.clone()), &config);
    (services, mock, temp_dir)
}

/// A report request payload as a client would submit it.
pub fn sample_payload() -> String {
    json!({
        "report": "exam_results",
        "filters": {"State": "Lagos", "exam_year": 2023},
        "format": "pdf",
    })
    .to_string()
}

/// Create an invoice and start its payment; returns both refs.
pub async fn started_payment(
    services: &Services,
    user_id: i64,
    total: Amount,
) -> (InvoiceRef, GatewayRef) {
    let invoice_ref = services
        .ledger
        .create_invoice(user_id, total, sample_payload())
        .await
        .unwrap();
    let start = services
        .reconciliation
        .start_payment(&invoice_ref, "payer@example.com", total)
        .await
        .unwrap();
    (invoice_ref, start.gateway_ref)
}
