//! # Gateway Core
//!
//! Core types, traits, and error handling for the chat gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Normalized chat request types
//! - The framed event stream every provider speaks internally
//! - The provider trait and its capability contract
//! - The closed error taxonomy mapped onto response status codes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod framing;
pub mod provider;
pub mod request;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult, StatusClass};
pub use event::{ErrorData, Event, EventKind, EventReceiver, EventStream, FunctionCall, MessageData};
pub use framing::FrameSplitter;
pub use provider::{ChatProvider, ProviderId};
pub use request::{ChatMessage, ChatRequest, MessageRole};
