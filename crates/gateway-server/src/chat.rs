//! Chat request routing.
//!
//! [`ChatService`] sits between the HTTP handlers and the provider adapters.
//! It resolves the adapter, consults the response cache, drives the adapter's
//! event stream and records the outcome in the stats recorder.
//!
//! Setup faults raised by `ask_stream` reach the caller as errors. Faults the
//! adapter reports on the stream are either collected into an error
//! (non-streaming) or forwarded to the client as they are (streaming).

use gateway_core::{
    ChatMessage, ChatProvider, ChatRequest, Event, EventReceiver, EventStream, GatewayError,
    GatewayResult,
};
use gateway_providers::ProviderRegistry;
use gateway_resilience::ResponseCache;
use gateway_telemetry::StatsRecorder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Provider used when the caller names none
pub const DEFAULT_PROVIDER: &str = "ddg";

/// Collected answer to a non-streaming request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    /// Provider that produced the answer
    pub provider: String,
    /// Requested model
    pub model: String,
    /// Concatenated message content
    pub content: String,
    /// Answered from cache
    pub cached: bool,
}

/// Cache key for a request: `chat:` followed by the hex SHA-256 of the
/// canonical JSON `{provider, model, messages}`
#[must_use]
pub fn fingerprint(provider: &str, request: &ChatRequest) -> String {
    #[derive(Serialize)]
    struct Canonical<'a> {
        provider: &'a str,
        model: &'a str,
        messages: &'a [ChatMessage],
    }

    let canonical = serde_json::to_vec(&Canonical {
        provider,
        model: &request.model,
        messages: &request.messages,
    })
    .unwrap_or_default();
    format!("chat:{}", hex::encode(Sha256::digest(&canonical)))
}

/// Routes chat requests to adapters
pub struct ChatService {
    registry: Arc<ProviderRegistry>,
    cache: ResponseCache,
    stats: Arc<StatsRecorder>,
}

impl ChatService {
    /// Create a service over shared context objects
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: ResponseCache,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            registry,
            cache,
            stats,
        }
    }

    fn resolve(&self, provider_id: &str, request: &ChatRequest) -> GatewayResult<Arc<dyn ChatProvider>> {
        request.validate()?;
        self.registry
            .get(provider_id)
            .ok_or_else(|| GatewayError::not_found(format!("Unknown provider: {provider_id}")))
    }

    async fn record(&self, request: &ChatRequest, status: u16, started: Instant, cached: bool) {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.stats
            .increment_request(&request.model, status, duration_ms, cached, request.prompt_text())
            .await;
    }

    /// Answer `request` in one piece
    ///
    /// # Errors
    /// Returns a bad-request or not-found error for invalid input, the
    /// adapter's setup fault, or an internal error when the adapter reports
    /// a failure on its stream
    pub async fn complete(&self, provider_id: &str, request: &ChatRequest) -> GatewayResult<ChatReply> {
        let provider = self.resolve(provider_id, request)?;
        let started = Instant::now();
        let key = fingerprint(provider_id, request);

        let reply = |content: String, cached: bool| ChatReply {
            provider: provider_id.to_string(),
            model: request.model.clone(),
            content,
            cached,
        };

        if let Some(content) = self.cache.get(&key).await {
            debug!(provider = %provider_id, model = %request.model, "Cache hit");
            self.record(request, 200, started, true).await;
            return Ok(reply(content, true));
        }

        let (stream, receiver) = EventStream::channel();
        if let Err(e) = provider.ask_stream(request, stream).await {
            warn!(provider = %provider_id, model = %request.model, error = %e, "Provider setup failed");
            self.record(request, e.status_code(), started, false).await;
            return Err(e);
        }

        match collect(receiver).await {
            Ok((content, finished)) => {
                if finished && !content.is_empty() {
                    self.cache.put(&key, &content).await;
                } else if !finished {
                    warn!(provider = %provider_id, model = %request.model, "Stream closed without done, answer not cached");
                }
                self.record(request, 200, started, false).await;
                info!(
                    provider = %provider_id,
                    model = %request.model,
                    duration_ms = started.elapsed().as_millis(),
                    "Chat completed"
                );
                Ok(reply(content, false))
            }
            Err(e) => {
                warn!(provider = %provider_id, model = %request.model, error = %e, "Provider stream failed");
                self.record(request, e.status_code(), started, false).await;
                Err(e)
            }
        }
    }

    /// Answer `request` incrementally. The returned reader yields the
    /// adapter's events; a cached answer is replayed as one message
    /// followed by `done`.
    ///
    /// # Errors
    /// Returns a bad-request or not-found error for invalid input, or the
    /// adapter's setup fault
    pub async fn stream(&self, provider_id: &str, request: &ChatRequest) -> GatewayResult<EventReceiver> {
        let provider = self.resolve(provider_id, request)?;
        let started = Instant::now();
        let key = fingerprint(provider_id, request);
        let (client, receiver) = EventStream::channel();

        if let Some(content) = self.cache.get(&key).await {
            debug!(provider = %provider_id, model = %request.model, "Replaying cached answer");
            client.write(&Event::message(content));
            client.write(&Event::Done);
            client.end();
            self.record(request, 200, started, true).await;
            return Ok(receiver);
        }

        let (upstream, upstream_rx) = EventStream::channel();
        if let Err(e) = provider.ask_stream(request, upstream).await {
            warn!(provider = %provider_id, model = %request.model, error = %e, "Provider setup failed");
            self.record(request, e.status_code(), started, false).await;
            return Err(e);
        }

        let tee = Tee {
            cache: self.cache.clone(),
            stats: Arc::clone(&self.stats),
            key,
            provider: provider_id.to_string(),
            model: request.model.clone(),
            prompt: request.prompt_text().to_string(),
            started,
        };
        tokio::spawn(tee.run(upstream_rx, client));
        Ok(receiver)
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("registry", &self.registry)
            .field("cache", &self.cache.backend_name())
            .finish_non_exhaustive()
    }
}

/// Concatenate message content until the stream ends. The flag reports
/// whether the adapter signalled `done`.
async fn collect(mut receiver: EventReceiver) -> GatewayResult<(String, bool)> {
    let mut content = String::new();
    while let Some(event) = receiver.next_event().await {
        match event {
            Event::Message(data) => content.push_str(&data.content),
            Event::Error(data) => {
                return Err(GatewayError::internal(data.message.unwrap_or(data.error)));
            }
            Event::Done => return Ok((content, true)),
            Event::Search(_) => {}
        }
    }
    Ok((content, false))
}

/// Forwards adapter events to the client while keeping a copy of the text
struct Tee {
    cache: ResponseCache,
    stats: Arc<StatsRecorder>,
    key: String,
    provider: String,
    model: String,
    prompt: String,
    started: Instant,
}

impl Tee {
    async fn run(self, mut upstream: EventReceiver, client: EventStream) {
        let mut content = String::new();
        let mut status = 200;
        let mut finished = false;

        while let Some(event) = upstream.next_event().await {
            match &event {
                Event::Message(data) => content.push_str(&data.content),
                Event::Error(data) => {
                    warn!(provider = %self.provider, model = %self.model, error = %data.error, "Provider stream failed");
                    status = 500;
                }
                Event::Done => finished = true,
                Event::Search(_) => {}
            }
            client.write(&event);
            if event.is_terminal() {
                break;
            }
        }
        client.end();

        if finished && !content.is_empty() {
            self.cache.put(&self.key, &content).await;
        }
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.stats
            .increment_request(&self.model, status, duration_ms, false, &self.prompt)
            .await;
        info!(
            provider = %self.provider,
            model = %self.model,
            status,
            duration_ms,
            "Chat stream finished"
        );
    }
}
