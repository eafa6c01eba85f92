//! Integration tests for the chat gateway
//!
//! This crate runs the real router on a local port against wiremock
//! upstreams and covers:
//! - API endpoint behavior
//! - Caching across requests and store outages
//! - End-to-end provider flows

pub mod fixtures;
pub mod helpers;
pub mod mock_providers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_providers::*;

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod e2e_tests;
