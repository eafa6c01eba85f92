//! # Gateway Providers
//!
//! Upstream chat provider adapters for the gateway:
//! - DuckDuckGo chat (session-token handshake, `data:` framed stream)
//! - Pollinations text (plain streamed body)
//!
//! Plus the shared outbound HTTP client factory and the provider registry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod duckduckgo;
pub mod http_client;
pub mod pollinations;
pub mod registry;

// Re-export main types
pub use duckduckgo::DuckDuckGoProvider;
pub use http_client::{
    ClientOptions, Connection, ErrorHook, HttpClientFactory, HttpError, PoolStats, ScopedClient,
    TrackedResponse,
};
pub use pollinations::PollinationsProvider;
pub use registry::{ProviderEntry, ProviderRegistry};
