//! Application state shared by every handler.

use crate::chat::ChatService;
use gateway_config::GatewayConfig;
use gateway_core::{GatewayError, GatewayResult};
use gateway_providers::{HttpClientFactory, ProviderRegistry};
use gateway_resilience::{PersistentStore, ResponseCache, ResponseCacheConfig, RetryPolicy};
use gateway_telemetry::StatsRecorder;
use std::sync::Arc;

/// Process-scoped context objects, built once at startup
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<GatewayConfig>,
    /// Provider adapters
    pub providers: Arc<ProviderRegistry>,
    /// Request router
    pub chat: Arc<ChatService>,
    /// Usage statistics
    pub stats: Arc<StatsRecorder>,
    /// Outbound HTTP clients and pool occupancy
    pub http: Arc<HttpClientFactory>,
}

impl AppState {
    /// Start building application state
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("providers", &self.providers)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AppState`]
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    providers: Option<ProviderRegistry>,
    http: Option<Arc<HttpClientFactory>>,
    store: Option<Arc<dyn PersistentStore>>,
}

impl AppStateBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this registry instead of the built-in adapters
    #[must_use]
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Share an existing client factory
    #[must_use]
    pub fn http(mut self, http: Arc<HttpClientFactory>) -> Self {
        self.http = Some(http);
        self
    }

    /// Back the cache and stats with a persistent store
    #[must_use]
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the state. Missing parts are derived from the configuration.
    ///
    /// # Errors
    /// Returns an internal error if the HTTP client factory or an adapter
    /// cannot be built
    pub fn build(self) -> GatewayResult<AppState> {
        let config = self.config.unwrap_or_default();

        let http = match self.http {
            Some(http) => http,
            None => Arc::new(HttpClientFactory::new(&config.http).map_err(|e| {
                GatewayError::internal(format!("Failed to create HTTP client factory: {e}"))
            })?),
        };

        let providers = match self.providers {
            Some(providers) => providers,
            None => ProviderRegistry::with_defaults(&http, &config)?,
        };
        let providers = Arc::new(providers);

        let cache = ResponseCache::new(
            &ResponseCacheConfig {
                capacity: config.cache.capacity,
                default_ttl_secs: config.cache.ttl_secs,
                retry: RetryPolicy::with_defaults(),
            },
            self.store.clone(),
        );
        let stats = Arc::new(StatsRecorder::new(self.store));
        let chat = Arc::new(ChatService::new(
            Arc::clone(&providers),
            cache,
            Arc::clone(&stats),
        ));

        Ok(AppState {
            config: Arc::new(config),
            providers,
            chat,
            stats,
            http,
        })
    }
}
