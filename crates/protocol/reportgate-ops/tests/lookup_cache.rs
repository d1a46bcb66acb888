//! Lookup data through the SQLite-backed cache.

use std::sync::Arc;

use reportgate_ops::{CacheBackendKind, Services};
use reportgate_store::{ReportStore, ReportStoreConfig};
use reportgate_test_utils::{create_test_services, test_config, MockProvider};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn record(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_reader_sees_own_write() {
    let (services, _mock, _temp) = create_test_services();
    let lookup = &services.lookup;

    lookup
        .record_written(record(json!({"State": "Lagos", "exam_year": 2023})))
        .await
        .unwrap();
    assert_eq!(lookup.distinct_values("State").await.unwrap(), vec!["Lagos"]);

    lookup
        .record_written(record(json!({"State": "Abuja"})))
        .await
        .unwrap();
    assert_eq!(
        lookup.distinct_values("State").await.unwrap(),
        vec!["Abuja", "Lagos"]
    );
    assert_eq!(lookup.dataset_snapshot().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cache_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.cache.backend = CacheBackendKind::Sqlite;

    {
        let store = ReportStore::open(ReportStoreConfig::new(temp.path())).unwrap();
        let services = Services::with_provider(&store, Arc::new(MockProvider::new()), &config);
        services
            .lookup
            .record_written(record(json!({"Subject": "Maths"})))
            .await
            .unwrap();
        services.lookup.distinct_values("Subject").await.unwrap();
    }

    let store = ReportStore::open(ReportStoreConfig::new(temp.path())).unwrap();
    let services = Services::with_provider(&store, Arc::new(MockProvider::new()), &config);
    assert_eq!(
        services.lookup.distinct_values("Subject").await.unwrap(),
        vec!["Maths"]
    );

    let stats = services.lookup.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.computations, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_reads_compute_once() {
    let (services, _mock, _temp) = create_test_services();
    services
        .lookup
        .record_written(record(json!({"State": "Kano"})))
        .await
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let lookup = Arc::clone(&services.lookup);
            tokio::spawn(async move { lookup.distinct_values("State").await })
        })
        .collect();
    for joined in futures::future::join_all(handles).await {
        assert_eq!(joined.unwrap().unwrap(), vec!["Kano"]);
    }
    assert_eq!(services.lookup.cache_stats().computations, 1);
}
