//! Test helper utilities for integration tests

use gateway_config::GatewayConfig;
use gateway_resilience::PersistentStore;
use gateway_server::{create_router, AppState};
use reqwest::{Client, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

static TRACING: OnceLock<()> = OnceLock::new();

/// Initialize tracing for tests when `TEST_LOG` is set
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        if std::env::var("TEST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

/// Gateway configuration pointing both adapters at mock origins, with
/// test-sized delays
pub fn test_config(ddg_url: &str, pollinations_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.duckduckgo.base_url = ddg_url.to_string();
    config.duckduckgo.use_proxy = false;
    config.duckduckgo.token_retry_delay = Duration::from_millis(5);
    config.duckduckgo.pacing_delay = Duration::from_millis(5);
    config.pollinations.base_url = pollinations_url.to_string();
    config.http.warmup_timeout = Duration::from_millis(500);
    config
}

/// Real gateway served on a local port
pub struct TestServer {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Base URL for the server
    pub base_url: String,
    /// State behind the router
    pub state: AppState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Serve the gateway built from `config`
    pub async fn start(config: GatewayConfig) -> Self {
        Self::start_with(config, None).await
    }

    /// Serve the gateway with an optional persistent store
    pub async fn start_with(config: GatewayConfig, store: Option<Arc<dyn PersistentStore>>) -> Self {
        init_tracing();

        let mut builder = AppState::builder().config(config);
        if let Some(store) = store {
            builder = builder.store(store);
        }
        let state = builder.build().expect("Failed to build state");

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let router = create_router(state.clone());

        // Spawn the server
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            base_url: format!("http://{addr}"),
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a streaming POST request and collect the whole body
    pub async fn post_streaming(&self, path: &str, body: &Value) -> (u16, String) {
        use futures::StreamExt;

        let response = self.post_json(path, body).await;
        let status = response.status().as_u16();

        let mut collected = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.expect("Body chunk failed"));
        }

        (status, String::from_utf8(collected).expect("UTF-8 body"))
    }

    /// Parse response body as JSON
    pub async fn json_body(response: Response) -> Value {
        response.json().await.expect("Failed to parse JSON")
    }

    /// Shutdown the test server
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Assert that a response has the expected status code
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Wait for a condition to be true with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Total requests recorded by the gateway behind `server`
pub async fn total_requests(server: &TestServer) -> u64 {
    server.state.stats.get_stats().await.total_requests
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_health() {
        let server = TestServer::start(GatewayConfig::default()).await;

        let response = server.get("/health").await;
        assert_status(&response, 200);

        let json = TestServer::json_body(response).await;
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let reached = wait_for(|| async { false }, Duration::from_millis(60)).await;
        assert!(!reached);
    }
}
