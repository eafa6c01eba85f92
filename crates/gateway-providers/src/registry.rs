//! Provider registry.
//!
//! Maps a symbolic identifier to an adapter instance. Built once at startup
//! and then shared read-only.

use crate::duckduckgo::DuckDuckGoProvider;
use crate::http_client::HttpClientFactory;
use crate::pollinations::PollinationsProvider;
use gateway_config::GatewayConfig;
use gateway_core::{ChatProvider, GatewayResult, ProviderId};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Provider id with the budget it advertises for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderEntry {
    /// Registry identifier
    pub id: ProviderId,
    /// Context size served, zero when unsupported
    pub support: u32,
}

/// Identifier to adapter lookup
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: IndexMap<ProviderId, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter
    ///
    /// # Errors
    /// Returns an error if an adapter's HTTP client cannot be built
    pub fn with_defaults(factory: &HttpClientFactory, config: &GatewayConfig) -> GatewayResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(DuckDuckGoProvider::new(
            factory,
            config.duckduckgo.clone(),
        )?));
        registry.register(Arc::new(PollinationsProvider::new(
            factory,
            &config.pollinations,
        )?));
        Ok(registry)
    }

    /// Register an adapter under its own id, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) -> Option<Arc<dyn ChatProvider>> {
        let id = provider.id().to_string();
        info!(provider = %id, "Registered provider");
        self.providers.insert(id, provider)
    }

    /// Adapter for `id`
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers.get(id).cloned()
    }

    /// Registered ids in registration order
    #[must_use]
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.keys().cloned().collect()
    }

    /// Every adapter's advertised budget for `model`
    #[must_use]
    pub fn support_for(&self, model: &str) -> Vec<ProviderEntry> {
        self.providers
            .iter()
            .map(|(id, provider)| ProviderEntry {
                id: id.clone(),
                support: provider.support(model),
            })
            .collect()
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no adapter is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_ids())
            .finish()
    }
}
