//! Provider capability contract.

use crate::error::GatewayResult;
use crate::event::EventStream;
use crate::request::ChatRequest;
use async_trait::async_trait;

/// Symbolic provider identifier used by the registry
pub type ProviderId = String;

/// A streaming chat backend.
///
/// The contract has two distinct failure channels:
///
/// - Failures before the upstream stream exists (token handshake, connection
///   refused, non-success status) are returned as `Err` from
///   [`ChatProvider::ask_stream`]. The stream is dropped without any frame,
///   which readers observe as a plain end.
/// - Failures after the upstream stream is open are written to the stream as
///   an `error` event followed by `end()`, never returned.
///
/// On `Ok`, the adapter owns the stream and will end it exactly once.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Registry identifier
    fn id(&self) -> &str;

    /// Maximum context size served for `model`; zero means unsupported
    fn support(&self, model: &str) -> u32;

    /// Start streaming a completion for `request` into `stream`.
    ///
    /// Returns once the upstream response is open; frames keep arriving on
    /// the stream after that.
    async fn ask_stream(&self, request: &ChatRequest, stream: EventStream) -> GatewayResult<()>;
}
