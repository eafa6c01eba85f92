//! Fault-degradation wrappers.
//!
//! Two execution paths for calls into unreliable backing services:
//!
//! - [`best_effort`]: retried under a [`RetryPolicy`]; a final failure is
//!   logged and replaced by a fallback value. Cache and stats traffic uses
//!   this path so that an outage only costs recomputation.
//! - [`must_succeed`]: a single attempt whose failure is logged and returned
//!   to the caller. Reserved for destructive operations.

use crate::retry::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use tracing::{error, warn};

/// Run `op` under `policy`; on final failure log it and return `fallback`
pub async fn best_effort<T, E, F, Fut>(
    operation: &'static str,
    policy: &RetryPolicy,
    fallback: T,
    op: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match policy.execute(op).await {
        Ok(value) => value,
        Err(e) => {
            warn!(
                operation = operation,
                attempts = policy.max_attempts(),
                error = %e,
                "Best-effort operation failed, degrading to fallback"
            );
            fallback
        }
    }
}

/// Run `op` once; log and propagate any failure
///
/// # Errors
/// Returns the error produced by `op`
pub async fn must_succeed<T, E, F, Fut>(operation: &'static str, op: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    op().await.map_err(|e| {
        error!(operation = operation, error = %e, "Required operation failed");
        e
    })
}
