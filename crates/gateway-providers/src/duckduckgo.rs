//! DuckDuckGo chat adapter.
//!
//! The upstream only accepts chat requests carrying a short-lived session
//! token. The token is read from the `x-vqd-4` header of the status
//! endpoint, or failing that from a `vqd="..."` attribute in the search
//! page. Cookies set during the handshake are forwarded with the chat call.

use crate::http_client::{ClientOptions, Connection, HttpClientFactory, HttpError, ScopedClient};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use gateway_config::DuckDuckGoConfig;
use gateway_core::{
    ChatMessage, ChatProvider, ChatRequest, Event, EventStream, FrameSplitter, GatewayError,
    GatewayResult,
};
use gateway_resilience::RetryPolicy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, SET_COOKIE};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Registry identifier
pub const PROVIDER_ID: &str = "ddg";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const STATUS_PATH: &str = "/duckchat/v1/status";
const SEARCH_PATH: &str = "/?q=duckduckgo&t=h_&ia=chat";
const CHAT_PATH: &str = "/duckchat/v1/chat";
const TOKEN_HEADER: &str = "x-vqd-4";

/// Upstream model name for a generic model identifier
#[must_use]
pub fn resolve_model(model: &str) -> &str {
    match model {
        "gpt-3.5-turbo" | "gpt-3.5-turbo-0125" => "gpt-4o-mini",
        "claude-3-haiku-20240307" => "claude-3-haiku-20240307",
        "llama-3-70b-chat" => "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        "mixtral-8x7b-instruct" => "mistralai/Mixtral-8x7B-Instruct-v0.1",
        other => other,
    }
}

/// Context size served for `model`
#[must_use]
pub fn token_budget(model: &str) -> u32 {
    match model {
        "claude-3-haiku-20240307" | "gpt-3.5-turbo-0125" => 150_000,
        "llama-3-70b-chat" | "mixtral-8x7b-instruct" | "gpt-3.5-turbo" => 10_000,
        _ => 0,
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("user-agent", USER_AGENT),
        ("accept", "*/*"),
        ("accept-language", "en-US,en;q=0.9"),
        ("referer", "https://duckduckgo.com/"),
        ("origin", "https://duckduckgo.com"),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("priority", "u=1"),
        ("pragma", "no-cache"),
        ("cache-control", "no-cache"),
    ] {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

/// Token plus the cookies collected while acquiring it
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    token: String,
    cookie: Option<String>,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    message: Option<String>,
}

/// Outcome of one upstream `data:` frame
#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Message(String),
    Finished,
    Skip,
}

fn parse_chunk(frame: &str) -> Chunk {
    let data = frame.replacen("data: ", "", 1);
    if data.trim() == "[DONE]" {
        return Chunk::Finished;
    }
    match serde_json::from_str::<UpstreamChunk>(&data) {
        Ok(UpstreamChunk {
            message: Some(message),
        }) if !message.is_empty() => Chunk::Message(message),
        _ => Chunk::Skip,
    }
}

/// Join `Set-Cookie` values into a `Cookie` header value
fn cookie_header(cookies: &[String]) -> Option<String> {
    let joined = cookies
        .iter()
        .filter_map(|c| c.split(';').next())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    (!joined.is_empty()).then_some(joined)
}

fn collect_cookies(headers: &HeaderMap, jar: &Mutex<Vec<String>>) {
    let mut jar = jar.lock();
    jar.extend(
        headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string),
    );
}

/// DuckDuckGo chat provider
pub struct DuckDuckGoProvider {
    client: ScopedClient,
    config: DuckDuckGoConfig,
    token_pattern: Regex,
}

impl DuckDuckGoProvider {
    /// Create the adapter
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(factory: &HttpClientFactory, config: DuckDuckGoConfig) -> GatewayResult<Self> {
        let connection = if config.use_proxy {
            Connection::Proxy(None)
        } else {
            Connection::Pooled
        };
        let client = factory
            .client(
                ClientOptions::new(config.base_url.clone())
                    .with_headers(browser_headers())
                    .with_connection(connection),
            )
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;
        let token_pattern = Regex::new(r#"vqd="([\w-]+)""#)
            .map_err(|e| GatewayError::internal(format!("Invalid token pattern: {e}")))?;

        Ok(Self {
            client,
            config,
            token_pattern,
        })
    }

    async fn token_from_status(&self, jar: &Mutex<Vec<String>>) -> Result<Option<String>, HttpError> {
        let response = self
            .client
            .send(self.client.get(STATUS_PATH).header("x-vqd-accept", "1"))
            .await?;
        collect_cookies(response.headers(), jar);
        Ok(response
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }

    async fn token_from_page(&self, jar: &Mutex<Vec<String>>) -> Result<Option<String>, HttpError> {
        let response = self.client.send(self.client.get(SEARCH_PATH)).await?;
        let headers = response.headers().clone();
        let body = response.text().await?;
        let token = self
            .token_pattern
            .captures(&body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        if token.is_some() {
            collect_cookies(&headers, jar);
        }
        Ok(token)
    }

    /// One attempt: status endpoint first, then the search page
    async fn attempt_token(&self, jar: &Mutex<Vec<String>>) -> GatewayResult<String> {
        match self.token_from_status(jar).await {
            Ok(Some(token)) => {
                debug!(strategy = "status", "Session token acquired");
                return Ok(token);
            }
            Ok(None) => debug!(strategy = "status", "No token header in response"),
            Err(e) => warn!(strategy = "status", error = %e, "Token strategy failed"),
        }

        match self.token_from_page(jar).await {
            Ok(Some(token)) => {
                debug!(strategy = "page", "Session token acquired");
                Ok(token)
            }
            Ok(None) => Err(GatewayError::internal("no token in search page")),
            Err(e) => {
                warn!(strategy = "page", error = %e, "Token strategy failed");
                Err(GatewayError::internal(e.to_string()))
            }
        }
    }

    async fn acquire_session(&self) -> GatewayResult<Session> {
        let jar = Mutex::new(Vec::new());
        let policy = RetryPolicy::fixed(self.config.token_attempts, self.config.token_retry_delay);

        let token = policy
            .execute(|| self.attempt_token(&jar))
            .await
            .map_err(|e| {
                error!(
                    attempts = policy.max_attempts(),
                    error = %e,
                    "Session token acquisition failed"
                );
                GatewayError::internal(
                    "Failed to get VQD token from DuckDuckGo (all strategies failed); \
                     account or IP likely blocked",
                )
            })?;

        let cookie = cookie_header(&jar.lock());
        Ok(Session { token, cookie })
    }
}

impl std::fmt::Debug for DuckDuckGoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDuckGoProvider")
            .field("client", &self.client)
            .field("token_attempts", &self.config.token_attempts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatProvider for DuckDuckGoProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn support(&self, model: &str) -> u32 {
        token_budget(model)
    }

    async fn ask_stream(&self, request: &ChatRequest, stream: EventStream) -> GatewayResult<()> {
        let session = self.acquire_session().await?;

        tokio::time::sleep(self.config.pacing_delay).await;

        let model = resolve_model(&request.model);
        info!(provider = PROVIDER_ID, model = %model, "Sending chat request");

        let mut chat = self
            .client
            .post(CHAT_PATH)
            .header(TOKEN_HEADER, session.token.as_str())
            .json(&ChatBody {
                model,
                messages: &request.messages,
            });
        if let Some(cookie) = &session.cookie {
            chat = chat.header(COOKIE, cookie.as_str());
        }

        let response = self.client.send(chat).await.map_err(|e| {
            error!(provider = PROVIDER_ID, error = %e, "Chat request failed");
            GatewayError::internal(e.to_string())
        })?;

        tokio::spawn(pump(response.bytes_stream(), stream));
        Ok(())
    }
}

/// Translate the upstream `data:` stream into events until it ends
async fn pump<S, E>(body: S, stream: EventStream)
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send,
    E: std::fmt::Display,
{
    futures::pin_mut!(body);
    let mut splitter = FrameSplitter::new();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(provider = PROVIDER_ID, error = %e, "Upstream stream failed");
                stream.write(&Event::error(e.to_string()));
                stream.end();
                return;
            }
        };
        for frame in splitter.push(&bytes) {
            if forward(&frame, &stream) {
                finish(&stream);
                return;
            }
        }
    }

    if let Some(rest) = splitter.finish() {
        forward(&rest, &stream);
    }
    finish(&stream);
}

/// Forward one frame; returns true when the upstream signalled completion
fn forward(frame: &str, stream: &EventStream) -> bool {
    match parse_chunk(frame) {
        Chunk::Message(content) => {
            stream.write(&Event::message(content));
            false
        }
        Chunk::Finished => true,
        Chunk::Skip => false,
    }
}

fn finish(stream: &EventStream) {
    stream.write(&Event::Done);
    stream.end();
}
