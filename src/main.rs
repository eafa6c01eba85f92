//! # Chat Gateway
//!
//! Streaming chat gateway over free third-party completion providers.
//!
//! ## Features
//!
//! - DuckDuckGo chat and Pollinations text adapters behind one event stream
//! - Response cache in memory or Redis
//! - Usage statistics with a bounded recent-activity log
//! - Shared keep-alive connection pool with a warm-up endpoint
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! chat-gateway
//!
//! # Start with a config file
//! GATEWAY_CONFIG=/path/to/config.yaml chat-gateway
//!
//! # Persist cache and stats
//! REDIS_URL=redis://localhost:6379 chat-gateway
//! ```

use gateway_config::{load_config, ExposeSecret, GatewayConfig};
use gateway_resilience::{PersistentStore, RedisStore};
use gateway_server::{AppState, Server};
use gateway_telemetry::{init_logging, LoggingConfig};
use std::sync::Arc;
use tracing::{error, info};

/// Application entry point
#[tokio::main]
async fn main() {
    // Load configuration before logging so the configured level applies
    let config = match load_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&LoggingConfig::from(&config.logging)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting chat gateway"
    );

    // Run the application
    if let Err(e) = run(config).await {
        error!(error = %e, "Application failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        persistent = config.store.is_configured(),
        "Configuration loaded"
    );

    let mut builder = AppState::builder();
    if let Some(store) = create_store(&config)? {
        builder = builder.store(store);
    }

    let server_config = config.server.clone();
    let state = builder.config(config).build()?;

    info!(
        providers = ?state.providers.provider_ids(),
        "Provider registry initialized"
    );

    Server::new(server_config, state).run().await?;

    Ok(())
}

/// Persistent store shared by the cache and the stats recorder
fn create_store(
    config: &GatewayConfig,
) -> Result<Option<Arc<dyn PersistentStore>>, Box<dyn std::error::Error>> {
    let Some(url) = config.store.url.as_ref().filter(|_| config.store.is_configured()) else {
        info!("No persistent store configured, using in-memory cache and stats");
        return Ok(None);
    };

    let store = RedisStore::new(url.expose_secret())?.with_command_timeout(config.store.command_timeout);
    info!("Persistent store configured");
    Ok(Some(Arc::new(store)))
}
