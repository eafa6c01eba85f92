//! Gateway configuration types.

use crate::error::{ConfigError, ConfigResult};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings
    pub server: ServerConfig,
    /// Log output
    pub logging: LoggingSettings,
    /// Optional persistent store
    pub store: StoreConfig,
    /// Response cache
    pub cache: CacheConfig,
    /// Outbound HTTP pool
    pub http: HttpConfig,
    /// Scraped chat provider
    pub duckduckgo: DuckDuckGoConfig,
    /// Plain text provider
    pub pollinations: PollinationsConfig,
}

impl GatewayConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::validation("server.port must be greater than 0"));
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::validation("server.host is required"));
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::validation(
                "cache.capacity must be greater than 0",
            ));
        }

        if self.duckduckgo.token_attempts == 0 {
            return Err(ConfigError::validation(
                "duckduckgo.token_attempts must be greater than 0",
            ));
        }

        check_url("duckduckgo.base_url", &self.duckduckgo.base_url)?;
        check_url("pollinations.base_url", &self.pollinations.base_url)?;
        if let Some(proxy) = &self.http.proxy {
            check_url("http.proxy", proxy)?;
        }
        if let Some(url) = &self.store.url {
            Url::parse(url.expose_secret())
                .map_err(|e| ConfigError::validation(format!("store.url is invalid: {e}")))?;
        }

        Ok(())
    }
}

fn check_url(field: &str, value: &str) -> ConfigResult<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::validation(format!("{field} is invalid: {e}")))
}

/// Listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum accepted request body in bytes
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            body_limit: 2 * 1024 * 1024,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Log settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Persistent store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URL; absent means memory-only operation
    pub url: Option<SecretString>,
    /// Per-command timeout
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Whether a persistent store is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.url
            .as_ref()
            .is_some_and(|u| !u.expose_secret().trim().is_empty())
    }
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// In-memory entry limit
    pub capacity: usize,
    /// Lifetime of cached answers in seconds; zero or negative never expires
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 5000,
            ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Idle sockets kept hot per host
    pub max_idle_per_host: usize,
    /// How long an idle socket is kept
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// TCP keep-alive interval
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Duration,
    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Proxy for providers that request one
    pub proxy: Option<String>,
    /// Concurrent warm-up requests issued by the keep-alive route
    pub warmup_requests: usize,
    /// Timeout of each warm-up request
    #[serde(with = "humantime_serde")]
    pub warmup_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 5,
            idle_timeout: Duration::from_secs(120),
            tcp_keepalive: Duration::from_secs(120),
            request_timeout: Duration::from_secs(60),
            proxy: None,
            warmup_requests: 2,
            warmup_timeout: Duration::from_secs(3),
        }
    }
}

/// Scraped chat provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DuckDuckGoConfig {
    /// Upstream origin
    pub base_url: String,
    /// Route through `http.proxy` when one is set
    pub use_proxy: bool,
    /// Attempts per token strategy
    pub token_attempts: u32,
    /// Pause between token attempts
    #[serde(with = "humantime_serde")]
    pub token_retry_delay: Duration,
    /// Pause between token acquisition and the chat request
    #[serde(with = "humantime_serde")]
    pub pacing_delay: Duration,
}

impl Default for DuckDuckGoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://duckduckgo.com".to_string(),
            use_proxy: true,
            token_attempts: 3,
            token_retry_delay: Duration::from_millis(1500),
            pacing_delay: Duration::from_millis(500),
        }
    }
}

/// Plain text provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollinationsConfig {
    /// Upstream origin
    pub base_url: String,
    /// Model sent when the request names none
    pub default_model: String,
}

impl Default for PollinationsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://text.pollinations.ai".to_string(),
            default_model: "openai".to_string(),
        }
    }
}
