//! Read-through cache for lookup data.
//!
//! [`CacheStore`] sits in front of a [`CacheBackend`] and adds:
//!
//! - **Read-through**: on a miss the caller's `compute` future runs and its
//!   successful result is stored with the requested TTL. Errors are never
//!   stored.
//! - **Single-flight**: concurrent misses on the same key wait for one
//!   computation instead of each running their own.
//! - **Invalidation wins**: a computation that overlaps an invalidation of
//!   its key still answers its callers but does not store its result.
//! - **Graceful degradation**: a failing backend turns every lookup into a
//!   direct `compute` call and is only logged.
//!
//! The cache is for read-mostly reference data. It never answers questions
//! about invoice status.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use reportgate_types::{current_timestamp, Timestamp, MAX_CACHE_KEY_LEN};

use crate::error::{Result, StoreError};
use crate::traits::CacheBackend;

// =============================================================================
// Keys
// =============================================================================

/// Build a cache key from a namespace and a free-form part.
///
/// Keys longer than [`MAX_CACHE_KEY_LEN`] are shortened to
/// `<prefix>:<sha256 hex of part>`.
pub fn cache_key(prefix: &str, part: &str) -> String {
    let key = format!("{prefix}:{part}");
    if key.len() <= MAX_CACHE_KEY_LEN {
        return key;
    }
    format!("{prefix}:{}", hex::encode(Sha256::digest(part.as_bytes())))
}

/// Shorten an already-assembled key if it is too long.
fn normalize_key(key: &str) -> String {
    if key.len() <= MAX_CACHE_KEY_LEN {
        return key.to_string();
    }
    match key.split_once(':') {
        Some((prefix, rest)) => cache_key(prefix, rest),
        None => hex::encode(Sha256::digest(key.as_bytes())),
    }
}

fn expiry(now: Timestamp, ttl: Duration) -> Timestamp {
    now.saturating_add(ttl.as_millis().min(u64::MAX as u128) as u64)
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters describing cache behaviour since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the backend
    pub hits: u64,
    /// Lookups that found nothing on first check
    pub misses: u64,
    /// `compute` invocations
    pub computations: u64,
    /// Explicit invalidations
    pub invalidations: u64,
    /// Backend failures that were degraded to direct computation
    pub backend_errors: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    invalidations: AtomicU64,
    backend_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// CacheStore
// =============================================================================

type FlightMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Invalidation generations: per key, plus one shared by every namespace.
#[derive(Default)]
struct Generations {
    keys: HashMap<String, u64>,
    namespaces: u64,
}

impl Generations {
    fn of(&self, key: &str) -> (u64, u64) {
        (self.keys.get(key).copied().unwrap_or(0), self.namespaces)
    }
}

/// Shared read-through cache.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    in_flight: Mutex<FlightMap>,
    generations: Mutex<Generations>,
    counters: Counters,
}

impl CacheStore {
    /// Create a cache over the given backend.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(HashMap::new()),
            generations: Mutex::new(Generations::default()),
            counters: Counters::default(),
        }
    }

    /// Create a cache backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// `compute` runs at most once per key across concurrent callers. Its
    /// error is returned to every caller that was waiting on it and nothing
    /// is cached. A value computed while `key` was invalidated is returned
    /// but not kept.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = normalize_key(key);

        if let Some(value) = self.lookup::<T>(&key).await {
            Counters::bump(&self.counters.hits);
            debug!(key = %key, "cache hit");
            return Ok(value);
        }
        Counters::bump(&self.counters.misses);

        let flight = self.flight(&key);
        let result = {
            let _guard = flight.lock().await;

            // Another caller may have filled the key while we waited
            if let Some(value) = self.lookup::<T>(&key).await {
                debug!(key = %key, "cache filled by concurrent caller");
                Ok(value)
            } else {
                debug!(key = %key, "cache miss, computing");
                Counters::bump(&self.counters.computations);
                let seen = self.generation(&key);
                match compute().await {
                    Ok(value) => {
                        self.store_unless_invalidated(&key, &value, ttl, seen).await;
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        self.release_flight(&key, flight);
        result
    }

    /// Remove `key` so the next lookup recomputes it.
    pub async fn invalidate(&self, key: &str) {
        let key = normalize_key(key);
        Counters::bump(&self.counters.invalidations);
        self.with_generations(|g| *g.keys.entry(key.clone()).or_insert(0) += 1);

        let backend = Arc::clone(&self.backend);
        let k = key.clone();
        if let Err(e) = run_blocking(move || backend.remove(&k)).await {
            Counters::bump(&self.counters.backend_errors);
            warn!(key = %key, error = %e, "cache invalidation failed");
        } else {
            debug!(key = %key, "cache entry invalidated");
        }
    }

    /// Remove every key in a namespace (`prefix:`).
    pub async fn invalidate_prefix(&self, prefix: &str) -> u64 {
        Counters::bump(&self.counters.invalidations);
        self.with_generations(|g| g.namespaces += 1);
        let backend = Arc::clone(&self.backend);
        let pattern = format!("{prefix}:");
        match run_blocking(move || backend.remove_prefix(&pattern)).await {
            Ok(removed) => {
                debug!(prefix, removed, "cache namespace invalidated");
                removed
            }
            Err(e) => {
                Counters::bump(&self.counters.backend_errors);
                warn!(prefix, error = %e, "cache namespace invalidation failed");
                0
            }
        }
    }

    /// Drop expired entries from the backend.
    pub async fn purge_expired(&self) -> Result<u64> {
        let backend = Arc::clone(&self.backend);
        run_blocking(move || backend.purge_expired(current_timestamp())).await
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = Arc::clone(&self.backend);
        let k = key.to_string();
        match run_blocking(move || backend.get(&k, current_timestamp())).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    // Stale shape from an older build; recompute
                    warn!(key = %key, error = %e, "undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                Counters::bump(&self.counters.backend_errors);
                warn!(key = %key, error = %e, "cache read failed, computing directly");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "value not cacheable");
                return;
            }
        };
        let backend = Arc::clone(&self.backend);
        let k = key.to_string();
        let expires_at = expiry(current_timestamp(), ttl);
        if let Err(e) = run_blocking(move || backend.put(&k, &raw, expires_at)).await {
            Counters::bump(&self.counters.backend_errors);
            warn!(key = %key, error = %e, "cache write failed");
        }
    }

    /// Store `value` only if `key` has not been invalidated since `seen`.
    ///
    /// The generation is checked again after the write; an invalidation
    /// that raced the write removes the entry.
    async fn store_unless_invalidated<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        seen: (u64, u64),
    ) {
        if self.generation(key) != seen {
            debug!(key = %key, "invalidated during computation, not stored");
            return;
        }
        self.store(key, value, ttl).await;
        if self.generation(key) != seen {
            let backend = Arc::clone(&self.backend);
            let k = key.to_string();
            if let Err(e) = run_blocking(move || backend.remove(&k)).await {
                Counters::bump(&self.counters.backend_errors);
                warn!(key = %key, error = %e, "cache entry removal failed");
            }
        }
    }

    fn generation(&self, key: &str) -> (u64, u64) {
        self.with_generations(|g| g.of(key))
    }

    fn with_generations<R>(&self, f: impl FnOnce(&mut Generations) -> R) -> R {
        let mut generations = match self.generations.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut generations)
    }

    fn flight(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.in_flight.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(map.entry(key.to_string()).or_default())
    }

    fn release_flight(&self, key: &str, flight: Arc<tokio::sync::Mutex<()>>) {
        let mut map = match self.in_flight.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Map entry plus ours: nobody else is waiting
        if Arc::strong_count(&flight) <= 2 {
            map.remove(key);
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

async fn run_blocking<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::task(e.to_string()))?
}

// =============================================================================
// Backends
// =============================================================================

/// Process-local cache backend.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, (String, Timestamp)>>,
}

impl MemoryCacheBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Timestamp)>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::lock_poisoned("cache map lock poisoned"))
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str, now: Timestamp) -> Result<Option<String>> {
        let entries = self.entries()?;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    fn put(&self, key: &str, value: &str, expires_at: Timestamp) -> Result<()> {
        self.entries()?
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    fn purge_expired(&self, now: Timestamp) -> Result<u64> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

/// Cache backend stored in the `cache_entries` table, shared across
/// processes using the same database.
pub struct SqliteCacheBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheBackend {
    /// Create a backend over the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))
    }
}

impl CacheBackend for SqliteCacheBackend {
    fn get(&self, key: &str, now: Timestamp) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str, expires_at: Timestamp) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at.min(i64::MAX as u64) as i64],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])?;
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<u64> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
            [prefix],
        )?;
        Ok(removed as u64)
    }

    fn purge_expired(&self, now: Timestamp) -> Result<u64> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            [now as i64],
        )?;
        Ok(removed as u64)
    }
}
