//! Pollinations text adapter.
//!
//! No handshake: one POST per request, and the body is plain text. Every
//! received chunk becomes a `message` event as it arrives.

use crate::http_client::{ClientOptions, HttpClientFactory, ScopedClient};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use gateway_config::PollinationsConfig;
use gateway_core::{
    ChatMessage, ChatProvider, ChatRequest, Event, EventStream, GatewayError, GatewayResult,
};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Registry identifier
pub const PROVIDER_ID: &str = "pollinations";

/// Budget advertised for every model
pub const TOKEN_BUDGET: u32 = 100_000;

#[derive(Serialize)]
struct TextRequest<'a> {
    messages: &'a [ChatMessage],
    model: &'a str,
    stream: bool,
}

/// Pollinations text provider
#[derive(Debug)]
pub struct PollinationsProvider {
    client: ScopedClient,
    default_model: String,
}

impl PollinationsProvider {
    /// Create the adapter on the shared pool
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(factory: &HttpClientFactory, config: &PollinationsConfig) -> GatewayResult<Self> {
        let client = factory
            .client(ClientOptions::new(config.base_url.clone()))
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            default_model: config.default_model.clone(),
        })
    }

    /// Origin the adapter talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl ChatProvider for PollinationsProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn support(&self, _model: &str) -> u32 {
        TOKEN_BUDGET
    }

    async fn ask_stream(&self, request: &ChatRequest, stream: EventStream) -> GatewayResult<()> {
        let model = if request.model.trim().is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };
        debug!(provider = PROVIDER_ID, model = %model, "Sending text request");

        let body = TextRequest {
            messages: &request.messages,
            model,
            stream: false,
        };
        let response = self
            .client
            .send(self.client.post("/").json(&body))
            .await
            .map_err(|e| {
                error!(provider = PROVIDER_ID, error = %e, "Text request failed");
                GatewayError::internal(e.to_string())
            })?;

        tokio::spawn(pump(response.bytes_stream(), stream));
        Ok(())
    }
}

/// Forward raw text chunks until the body ends
async fn pump<S, E>(body: S, stream: EventStream)
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send,
    E: std::fmt::Display,
{
    futures::pin_mut!(body);
    let mut pending = Vec::new();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                pending.extend_from_slice(&bytes);
                let text = take_utf8(&mut pending);
                if !text.is_empty() {
                    stream.write(&Event::message(text));
                }
            }
            Err(e) => {
                warn!(provider = PROVIDER_ID, error = %e, "Upstream stream failed");
                stream.write(&Event::error(e.to_string()));
                stream.end();
                return;
            }
        }
    }

    if !pending.is_empty() {
        stream.write(&Event::message(String::from_utf8_lossy(&pending).into_owned()));
    }
    stream.write(&Event::Done);
    stream.end();
}

/// Drain the longest valid UTF-8 prefix, keeping an incomplete trailing
/// sequence for the next chunk
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending).map(|_| ()) {
        Ok(()) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}
