//! # Gateway Resilience
//!
//! Resilience patterns for the chat gateway:
//! - Retry policy with exponential backoff
//! - Best-effort and must-succeed execution wrappers
//! - Persistent key-value store abstraction with a Redis implementation
//! - Response cache over an in-memory or persistent backend

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod degrade;
pub mod response_cache;
pub mod retry;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use degrade::{best_effort, must_succeed};
pub use response_cache::{
    CacheBackend, MemoryCache, PersistentCache, ResponseCache, ResponseCacheConfig,
};
pub use retry::{RetryConfig, RetryPolicy};
pub use store::{PersistentStore, RedisStore, StoreError, StoreOp, StoreResult};
