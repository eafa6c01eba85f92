//! # Gateway Telemetry
//!
//! Observability for the chat gateway:
//! - Structured logging setup (pretty or JSON)
//! - Usage statistics kept in memory and mirrored to the persistent store

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod stats;

// Re-export main types
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use stats::{preview, Clock, DbUsage, RequestLog, Stats, StatsRecorder, LOG_LIMIT};
