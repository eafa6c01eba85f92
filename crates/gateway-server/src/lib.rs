//! # Gateway Server
//!
//! HTTP surface of the chat gateway.
//!
//! This crate provides:
//! - The request router that ties adapters, cache and stats together
//! - Axum routes for chat, stats, keep-alive and health
//! - Request ID, logging and CORS middleware

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chat;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use chat::{fingerprint, ChatReply, ChatService, DEFAULT_PROVIDER};
pub use error::ApiError;
pub use routes::create_router;
pub use server::{Server, ServerError};
pub use state::{AppState, AppStateBuilder};
