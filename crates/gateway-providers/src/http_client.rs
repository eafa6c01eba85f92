//! Outbound HTTP client factory.
//!
//! Every pooled client shares one process-wide [`reqwest::Client`], so idle
//! sockets opened by one adapter are reused by the next call to the same
//! host. Proxied clients get their own tunnel and are not pooled.
//!
//! The factory also tracks request lifecycle to report pool occupancy:
//! a request is *waiting* until response headers arrive, *active* while its
//! body is read, and its socket is *idle* afterwards. Idle sockets are reused
//! last-in-first-out, capped at the per-host idle limit, and aged out after
//! the idle timeout.
//!
//! reqwest does not expose its connection pool, so these figures are derived
//! from request lifecycle alone. The idle count is an estimate across all
//! hosts: every response is assumed to reuse the most recent idle socket,
//! whether or not hyper actually did.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use gateway_config::HttpConfig;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Outbound call failure
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport or protocol error
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// No response headers within the request timeout
    #[error("no response within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream answered with a non-success status
    #[error("upstream returned status {0}")]
    Status(u16),
}

impl HttpError {
    /// Upstream status, when one was received
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Timeout(_) => None,
        }
    }
}

/// Observer called for every failed outbound call
pub type ErrorHook = Arc<dyn Fn(&HttpError) + Send + Sync>;

/// Pool occupancy snapshot.
///
/// Estimated from request lifecycle rather than read from the underlying
/// pool, and aggregated over every host the shared client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Requests whose body is being read
    pub active_connections: usize,
    /// Sockets kept hot for reuse
    pub idle_connections: usize,
    /// Requests sent but not yet answered
    pub waiting_requests: usize,
    /// Idle socket limit
    pub max_free_sockets: usize,
}

#[derive(Debug)]
struct PoolTracker {
    waiting: AtomicUsize,
    active: AtomicUsize,
    idle: Mutex<Vec<Instant>>,
    max_idle: usize,
    idle_timeout: Duration,
}

impl PoolTracker {
    fn new(max_idle: usize, idle_timeout: Duration) -> Self {
        Self {
            waiting: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            idle: Mutex::new(Vec::new()),
            max_idle,
            idle_timeout,
        }
    }

    fn purge(&self, idle: &mut Vec<Instant>) {
        let timeout = self.idle_timeout;
        idle.retain(|released| released.elapsed() < timeout);
    }

    fn begin(self: &Arc<Self>) -> WaitingGuard {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        WaitingGuard {
            tracker: Arc::clone(self),
        }
    }

    fn snapshot(&self) -> PoolStats {
        let mut idle = self.idle.lock();
        self.purge(&mut idle);
        PoolStats {
            active_connections: self.active.load(Ordering::SeqCst),
            idle_connections: idle.len(),
            waiting_requests: self.waiting.load(Ordering::SeqCst),
            max_free_sockets: self.max_idle,
        }
    }
}

struct WaitingGuard {
    tracker: Arc<PoolTracker>,
}

impl WaitingGuard {
    fn into_active(self) -> ActiveGuard {
        let tracker = Arc::clone(&self.tracker);
        drop(self);
        tracker.active.fetch_add(1, Ordering::SeqCst);
        {
            let mut idle = tracker.idle.lock();
            tracker.purge(&mut idle);
            // Most recently released socket is reused first
            idle.pop();
        }
        ActiveGuard { tracker }
    }
}

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        self.tracker.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ActiveGuard {
    tracker: Arc<PoolTracker>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
        let mut idle = self.tracker.idle.lock();
        self.tracker.purge(&mut idle);
        idle.push(Instant::now());
        if idle.len() > self.tracker.max_idle {
            idle.remove(0);
        }
    }
}

/// How a client reaches its upstream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Connection {
    /// Shared keep-alive pool
    #[default]
    Pooled,
    /// Dedicated proxy tunnel; `None` uses the configured proxy, falling
    /// back to the pool when there is none
    Proxy(Option<String>),
}

/// Per-client options
#[derive(Clone, Default)]
pub struct ClientOptions {
    base_url: String,
    headers: HeaderMap,
    connection: Connection,
    on_error: Option<ErrorHook>,
}

impl ClientOptions {
    /// Options for a client rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Headers sent with every request
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Connection strategy
    #[must_use]
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connection = connection;
        self
    }

    /// Observe failed calls without changing their outcome
    #[must_use]
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("connection", &self.connection)
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds outbound clients
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    pooled: Client,
    settings: HttpConfig,
    tracker: Arc<PoolTracker>,
}

impl HttpClientFactory {
    /// Create the factory and its shared pool
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(settings: &HttpConfig) -> Result<Self, HttpError> {
        let pooled = Self::builder(settings).build()?;
        info!(
            max_idle_per_host = settings.max_idle_per_host,
            idle_timeout_secs = settings.idle_timeout.as_secs(),
            "HTTP connection pool initialized"
        );
        Ok(Self {
            pooled,
            settings: settings.clone(),
            tracker: Arc::new(PoolTracker::new(
                settings.max_idle_per_host,
                settings.idle_timeout,
            )),
        })
    }

    fn builder(settings: &HttpConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .pool_idle_timeout(settings.idle_timeout)
            .tcp_keepalive(settings.tcp_keepalive)
            .connect_timeout(settings.request_timeout)
    }

    /// Build a client for `options`
    ///
    /// # Errors
    /// Returns an error if a proxy URL is invalid
    pub fn client(&self, options: ClientOptions) -> Result<ScopedClient, HttpError> {
        let proxy = match &options.connection {
            Connection::Pooled => None,
            Connection::Proxy(Some(url)) => Some(url.clone()),
            Connection::Proxy(None) => self.settings.proxy.clone(),
        };

        let (client, tracker) = match proxy {
            Some(url) => {
                debug!(base_url = %options.base_url, "Building proxied client");
                let client = Self::builder(&self.settings)
                    .proxy(reqwest::Proxy::all(url.as_str())?)
                    .build()?;
                (client, None)
            }
            None => (self.pooled.clone(), Some(Arc::clone(&self.tracker))),
        };

        Ok(ScopedClient {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            headers: options.headers,
            tracker,
            on_error: options.on_error,
            request_timeout: self.settings.request_timeout,
        })
    }

    /// Current pool occupancy
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.tracker.snapshot()
    }

    /// Open `count` concurrent short requests to `url` through the pool so
    /// that their sockets stay hot. Individual failures are ignored.
    /// Returns the number of requests that succeeded.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built
    pub async fn warm_up(&self, url: &str, count: usize, timeout: Duration) -> Result<usize, HttpError> {
        let client = self.client(ClientOptions::new(url))?.with_request_timeout(timeout);
        let requests = (0..count).map(|_| {
            let client = client.clone();
            async move {
                let response = client.send(client.get("/")).await.ok()?;
                response.bytes().await.ok()
            }
        });
        let succeeded = futures::future::join_all(requests)
            .await
            .into_iter()
            .flatten()
            .count();
        debug!(url = %url, requested = count, succeeded, "Connection warm-up finished");
        Ok(succeeded)
    }
}

/// Client bound to one upstream origin
#[derive(Clone)]
pub struct ScopedClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
    tracker: Option<Arc<PoolTracker>>,
    on_error: Option<ErrorHook>,
    request_timeout: Duration,
}

impl ScopedClient {
    /// Origin this client is bound to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Override the time allowed for response headers
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// GET `path` with the default headers
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).headers(self.headers.clone())
    }

    /// POST to `path` with the default headers
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).headers(self.headers.clone())
    }

    /// Send a request built from this client. Non-success statuses are
    /// returned as errors.
    ///
    /// # Errors
    /// Returns an error on transport failure, timeout, or non-success status
    pub async fn send(&self, request: RequestBuilder) -> Result<TrackedResponse, HttpError> {
        let waiting = self.tracker.as_ref().map(PoolTracker::begin);

        let result = match tokio::time::timeout(self.request_timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(HttpError::Request(e)),
            Err(_) => Err(HttpError::Timeout(self.request_timeout)),
        };

        let outcome = result.and_then(|response| {
            let guard = waiting.map(WaitingGuard::into_active);
            let status = response.status();
            if status.is_success() {
                Ok(TrackedResponse {
                    response,
                    slot: guard,
                })
            } else {
                Err(HttpError::Status(status.as_u16()))
            }
        });

        if let (Err(e), Some(hook)) = (&outcome, &self.on_error) {
            hook(e);
        }
        outcome
    }
}

impl fmt::Debug for ScopedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedClient")
            .field("base_url", &self.base_url)
            .field("pooled", &self.tracker.is_some())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Successful response that holds its pool slot until consumed or dropped
pub struct TrackedResponse {
    response: Response,
    slot: Option<ActiveGuard>,
}

impl TrackedResponse {
    /// Response status
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Read the whole body as text
    ///
    /// # Errors
    /// Returns an error if the body cannot be read
    pub async fn text(self) -> Result<String, HttpError> {
        Ok(self.response.text().await?)
    }

    /// Read the whole body
    ///
    /// # Errors
    /// Returns an error if the body cannot be read
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        Ok(self.response.bytes().await?)
    }

    /// Body as a chunk stream; the pool slot is released when the stream is
    /// dropped
    pub fn bytes_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        let slot = self.slot;
        self.response.bytes_stream().map(move |chunk| {
            let _held = &slot;
            chunk
        })
    }
}

impl fmt::Debug for TrackedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedResponse")
            .field("status", &self.response.status())
            .finish_non_exhaustive()
    }
}
