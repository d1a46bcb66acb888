//! Cached lookup data.
//!
//! Distinct column values and the dataset snapshot are served through the
//! read-through cache. Writes made through [`LookupService::record_written`]
//! drop the affected entries so readers never see data older than their
//! own writes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info};

use reportgate_store::{cache_key, validate_column, CacheStats, CacheStore, DatasetSource, ReportStore};
use reportgate_types::{DATASET_SNAPSHOT_KEY, DISTINCT_KEY_PREFIX};

use crate::error::{OpsError, OpsResult};
use crate::helpers::run_store;

/// Read-mostly reference data behind a cache.
pub struct LookupService {
    dataset: Arc<dyn DatasetSource>,
    cache: Arc<CacheStore>,
    ttl: Duration,
    store_timeout: Duration,
}

impl LookupService {
    /// Create a lookup service caching entries for `ttl`.
    pub fn new(
        dataset: Arc<dyn DatasetSource>,
        cache: Arc<CacheStore>,
        ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            dataset,
            cache,
            ttl,
            store_timeout,
        }
    }

    /// Create a lookup service over a [`ReportStore`]'s dataset.
    pub fn from_store(
        store: &ReportStore,
        cache: Arc<CacheStore>,
        ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self::new(store.dataset.clone(), cache, ttl, store_timeout)
    }

    /// Distinct values of `column`, sorted.
    pub async fn distinct_values(&self, column: &str) -> OpsResult<Vec<String>> {
        validate_column(column).map_err(|e| OpsError::InvalidInput(e.to_string()))?;

        let key = cache_key(DISTINCT_KEY_PREFIX, column);
        let dataset = Arc::clone(&self.dataset);
        let col = column.to_string();
        let timeout = self.store_timeout;

        self.cache
            .get_or_compute(&key, self.ttl, move || {
                run_store(timeout, format!("distinct values of {}", col), move || {
                    dataset.distinct_values(&col)
                })
            })
            .await
    }

    /// Every dataset record.
    pub async fn dataset_snapshot(&self) -> OpsResult<Vec<Value>> {
        let dataset = Arc::clone(&self.dataset);
        let timeout = self.store_timeout;

        self.cache
            .get_or_compute(DATASET_SNAPSHOT_KEY, self.ttl, move || {
                run_store(timeout, "dataset snapshot", move || dataset.snapshot())
            })
            .await
    }

    /// Insert a record and drop the cache entries it affects.
    pub async fn record_written(&self, record: Map<String, Value>) -> OpsResult<i64> {
        for column in record.keys() {
            validate_column(column).map_err(|e| OpsError::InvalidInput(e.to_string()))?;
        }

        let columns: Vec<String> = record.keys().cloned().collect();
        let dataset = Arc::clone(&self.dataset);
        let id = run_store(self.store_timeout, "insert dataset record", move || {
            dataset.insert_record(&record)
        })
        .await?;

        self.cache.invalidate(DATASET_SNAPSHOT_KEY).await;
        for column in &columns {
            self.cache
                .invalidate(&cache_key(DISTINCT_KEY_PREFIX, column))
                .await;
        }
        debug!(id, columns = columns.len(), "Dataset record written");
        Ok(id)
    }

    /// Drop every cached lookup and rebuild the snapshot.
    ///
    /// Returns the number of records in the new snapshot.
    pub async fn refresh_snapshot(&self) -> OpsResult<usize> {
        self.cache.invalidate(DATASET_SNAPSHOT_KEY).await;
        let dropped = self.cache.invalidate_prefix(DISTINCT_KEY_PREFIX).await;

        let records = self.dataset_snapshot().await?;
        info!(records = records.len(), dropped, "Lookup cache refreshed");
        Ok(records.len())
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl std::fmt::Debug for LookupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupService")
            .field("cache", &self.cache)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> LookupService {
        let store = ReportStore::open_in_memory().unwrap();
        LookupService::from_store(
            &store,
            Arc::new(CacheStore::in_memory()),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
    }

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_distinct_values_cached_until_write() {
        let lookup = service();
        lookup
            .record_written(record(json!({"region": "North", "product": "Maize"})))
            .await
            .unwrap();

        let first = lookup.distinct_values("region").await.unwrap();
        assert_eq!(first, vec!["North".to_string()]);
        let _ = lookup.distinct_values("region").await.unwrap();
        assert_eq!(lookup.cache_stats().computations, 1);

        lookup
            .record_written(record(json!({"region": "South"})))
            .await
            .unwrap();
        let after = lookup.distinct_values("region").await.unwrap();
        assert_eq!(after, vec!["North".to_string(), "South".to_string()]);
        assert_eq!(lookup.cache_stats().computations, 2);
    }

    #[tokio::test]
    async fn test_snapshot_sees_own_write() {
        let lookup = service();
        assert!(lookup.dataset_snapshot().await.unwrap().is_empty());

        lookup
            .record_written(record(json!({"region": "East"})))
            .await
            .unwrap();
        assert_eq!(lookup.dataset_snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_column() {
        let lookup = service();
        assert!(matches!(
            lookup.distinct_values("region; DROP TABLE x").await,
            Err(OpsError::InvalidInput(_))
        ));
        assert!(matches!(
            lookup.record_written(record(json!({"bad-name": 1}))).await,
            Err(OpsError::InvalidInput(_))
        ));
        assert_eq!(lookup.cache_stats().computations, 0);
    }

    #[tokio::test]
    async fn test_refresh_snapshot_drops_distinct_entries() {
        let lookup = service();
        lookup
            .record_written(record(json!({"region": "North"})))
            .await
            .unwrap();
        lookup.distinct_values("region").await.unwrap();
        lookup.dataset_snapshot().await.unwrap();

        assert_eq!(lookup.refresh_snapshot().await.unwrap(), 1);
        let computed = lookup.cache_stats().computations;
        lookup.distinct_values("region").await.unwrap();
        assert_eq!(lookup.cache_stats().computations, computed + 1);
    }
}
