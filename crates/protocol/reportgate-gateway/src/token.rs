//! Bearer token cache for providers that issue short-lived tokens.
//!
//! The cache holds at most one token. Callers that find it missing or near
//! expiry queue behind a single refresh instead of each requesting a new
//! token from the provider.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use reportgate_types::DEFAULT_TOKEN_LIFETIME;

use crate::error::GatewayResult;

/// A token as issued by the provider.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The bearer token.
    pub access_token: String,
    /// Lifetime reported by the provider, if any.
    pub expires_in: Option<Duration>,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Single-flight cache for one bearer token.
#[derive(Debug)]
pub struct TokenCache {
    state: Mutex<Option<CachedToken>>,
    margin: Duration,
    refreshes: AtomicU64,
}

impl TokenCache {
    /// Create a cache that refreshes `margin` before expiry.
    pub fn new(margin: Duration) -> Self {
        Self {
            state: Mutex::new(None),
            margin,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return the cached token, fetching a new one if missing or stale.
    ///
    /// The lock is held across `fetch`, so concurrent callers wait for the
    /// in-flight refresh and then reuse its result. A failed fetch leaves the
    /// cache empty.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> GatewayResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<IssuedToken>>,
    {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }

        let issued = fetch().await?;
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        let lifetime = issued.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let refresh_at = Instant::now() + lifetime.saturating_sub(self.margin);
        debug!(lifetime_secs = lifetime.as_secs(), "Cached new bearer token");

        *state = Some(CachedToken {
            token: issued.access_token.clone(),
            refresh_at,
        });
        Ok(issued.access_token)
    }

    /// Drop the cached token; the next caller fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }

    /// Number of successful fetches so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}
