//! Response cache.
//!
//! Completed answers are cached under a request fingerprint. The backend is
//! chosen once at startup: a persistent store when one is configured,
//! otherwise a bounded in-memory map.
//!
//! Neither backend surfaces faults. A failed read is a miss and a failed
//! write is logged and dropped, so an outage only forces recomputation.

use crate::degrade::best_effort;
use crate::retry::RetryPolicy;
use crate::store::{truncate_key, PersistentStore};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Cache backend
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Stored value, or `None` when absent, expired, or unreadable
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value` for `ttl_secs`; zero or negative never expires
    async fn set(&self, key: &str, value: &str, ttl_secs: i64);

    /// Whether a live entry exists
    async fn has(&self, key: &str) -> bool;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: &str, ttl_secs: i64) -> Self {
        let expires_at = u64::try_from(ttl_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        Self {
            value: value.to_string(),
            expires_at,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// Bounded in-memory backend.
///
/// Entries are kept in insertion order. When a new key would exceed the
/// capacity the earliest-inserted entry is evicted. Expired entries are only
/// removed when read, so an unread expired entry still counts toward the
/// bound.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<IndexMap<String, CacheEntry>>,
    capacity: usize,
}

impl MemoryCache {
    /// Default entry limit
    pub const DEFAULT_CAPACITY: usize = 5000;

    /// Create a cache holding at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of physically stored entries, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let expired = entries.get(key)?.is_expired();
        if expired {
            entries.shift_remove(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.live_value(key)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: i64) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                debug!(key = %truncate_key(&evicted), "Evicted oldest cache entry");
            }
        }
        entries.insert(key.to_string(), CacheEntry::new(value, ttl_secs));
    }

    async fn has(&self, key: &str) -> bool {
        self.live_value(key).is_some()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Backend over a [`PersistentStore`] with retry and fault swallowing
pub struct PersistentCache {
    store: Arc<dyn PersistentStore>,
    retry: RetryPolicy,
}

impl PersistentCache {
    /// Create with the default 100ms/200ms/400ms backoff
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self::with_retry(store, RetryPolicy::with_defaults())
    }

    /// Create with a custom retry policy
    #[must_use]
    pub fn with_retry(store: Arc<dyn PersistentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }
}

#[async_trait]
impl CacheBackend for PersistentCache {
    async fn get(&self, key: &str) -> Option<String> {
        best_effort("cache.get", &self.retry, None, || self.store.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: i64) {
        let ttl = u64::try_from(ttl_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        best_effort("cache.set", &self.retry, (), || self.store.set(key, value, ttl)).await;
    }

    async fn has(&self, key: &str) -> bool {
        best_effort("cache.has", &self.retry, false, || self.store.exists(key)).await
    }

    fn name(&self) -> &'static str {
        "persistent"
    }
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct ResponseCacheConfig {
    /// In-memory entry limit
    pub capacity: usize,
    /// TTL applied by [`ResponseCache::put`]
    pub default_ttl_secs: i64,
    /// Backoff for persistent-store calls
    pub retry: RetryPolicy,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            capacity: MemoryCache::DEFAULT_CAPACITY,
            default_ttl_secs: 30 * 24 * 60 * 60,
            retry: RetryPolicy::with_defaults(),
        }
    }
}

/// Response cache over a single backend
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    default_ttl_secs: i64,
}

impl ResponseCache {
    /// Select the backend: persistent when `store` is given, memory otherwise
    #[must_use]
    pub fn new(config: &ResponseCacheConfig, store: Option<Arc<dyn PersistentStore>>) -> Self {
        let backend: Arc<dyn CacheBackend> = match store {
            Some(store) => Arc::new(PersistentCache::with_retry(store, config.retry.clone())),
            None => Arc::new(MemoryCache::new(config.capacity)),
        };
        info!(
            backend = backend.name(),
            default_ttl_secs = config.default_ttl_secs,
            "Response cache initialized"
        );
        Self {
            backend,
            default_ttl_secs: config.default_ttl_secs,
        }
    }

    /// Cached value for `key`
    pub async fn get(&self, key: &str) -> Option<String> {
        let value = self.backend.get(key).await;
        debug!(key = %truncate_key(key), hit = value.is_some(), "Cache lookup");
        value
    }

    /// Store with an explicit TTL
    pub async fn set(&self, key: &str, value: &str, ttl_secs: i64) {
        self.backend.set(key, value, ttl_secs).await;
    }

    /// Store with the configured default TTL
    pub async fn put(&self, key: &str, value: &str) {
        self.set(key, value, self.default_ttl_secs).await;
    }

    /// Whether a live entry exists
    pub async fn has(&self, key: &str) -> bool {
        self.backend.has(key).await
    }

    /// Active backend name
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("backend", &self.backend.name())
            .field("default_ttl_secs", &self.default_ttl_secs)
            .finish()
    }
}
