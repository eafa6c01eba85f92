//! Persistent key-value store.
//!
//! A single [`PersistentStore`] handle is shared by the response cache and
//! the stats recorder. [`RedisStore`] connects lazily on first use and keeps
//! one multiplexed [`ConnectionManager`] for the lifetime of the process.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the Redis client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store could not be reached in time
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored value had an unexpected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// One command of an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Increment an integer key
    Incr {
        /// Counter key
        key: String,
        /// Amount to add
        delta: i64,
    },
    /// Increment one field of a hash
    HashIncr {
        /// Hash key
        key: String,
        /// Field within the hash
        field: String,
        /// Amount to add
        delta: i64,
    },
    /// Push a value onto the head of a list
    ListPush {
        /// List key
        key: String,
        /// Value to push
        value: String,
    },
    /// Keep only the inclusive range `start..=stop` of a list
    ListTrim {
        /// List key
        key: String,
        /// First index kept
        start: isize,
        /// Last index kept
        stop: isize,
    },
}

/// Persistent key-value store
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Read a string value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a string value, expiring after `ttl` when given
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Whether `key` exists
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Read an integer counter; missing keys read as zero
    async fn get_counter(&self, key: &str) -> StoreResult<i64>;

    /// Read every field of an integer hash
    async fn hash_counters(&self, key: &str) -> StoreResult<HashMap<String, i64>>;

    /// Read the inclusive range `start..=stop` of a list
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    /// Apply all operations atomically
    async fn execute_batch(&self, ops: Vec<StoreOp>) -> StoreResult<()>;

    /// Approximate number of keys
    async fn key_count(&self) -> StoreResult<u64>;

    /// Remove every key
    async fn flush(&self) -> StoreResult<()>;
}

/// Redis-backed store
pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Default per-command timeout
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a store for `url`. No connection is made until first use.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be parsed
    pub fn new(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            command_timeout: Self::DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Set the per-command timeout
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("Connected to persistent store");
                Ok::<_, StoreError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    async fn run<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let timeout = self.command_timeout;
        let fut = async {
            let conn = self.connection().await?;
            let value = op(conn).await?;
            Ok::<T, StoreError>(value)
        };
        tokio::time::timeout(timeout, fut).await.map_err(|_| {
            StoreError::Unavailable(format!("no reply within {}ms", timeout.as_millis()))
        })?
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.connection.initialized())
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PersistentStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.run(|mut conn| async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        debug!(key = %truncate_key(key), ttl_secs = ttl.map(|t| t.as_secs()), "Store set");
        self.run(|mut conn| async move {
            match ttl {
                Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
                None => conn.set(key, value).await,
            }
        })
        .await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.run(|mut conn| async move { conn.exists(key).await }).await
    }

    async fn get_counter(&self, key: &str) -> StoreResult<i64> {
        let value: Option<i64> = self.run(|mut conn| async move { conn.get(key).await }).await?;
        Ok(value.unwrap_or(0))
    }

    async fn hash_counters(&self, key: &str) -> StoreResult<HashMap<String, i64>> {
        self.run(|mut conn| async move { conn.hgetall(key).await }).await
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.run(|mut conn| async move { conn.lrange(key, start, stop).await })
            .await
    }

    async fn execute_batch(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                StoreOp::Incr { key, delta } => pipe.incr(key, *delta).ignore(),
                StoreOp::HashIncr { key, field, delta } => pipe.hincr(key, field, *delta).ignore(),
                StoreOp::ListPush { key, value } => pipe.lpush(key, value).ignore(),
                StoreOp::ListTrim { key, start, stop } => pipe.ltrim(key, *start, *stop).ignore(),
            };
        }
        self.run(|mut conn| async move { pipe.query_async::<()>(&mut conn).await })
            .await
    }

    async fn key_count(&self) -> StoreResult<u64> {
        self.run(|mut conn| async move { redis::cmd("DBSIZE").query_async(&mut conn).await })
            .await
    }

    async fn flush(&self) -> StoreResult<()> {
        self.run(|mut conn| async move { redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await })
            .await
    }
}

/// Shorten a key for log output
pub(crate) fn truncate_key(key: &str) -> &str {
    match key.char_indices().nth(20) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}
