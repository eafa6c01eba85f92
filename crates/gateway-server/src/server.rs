//! Server runner.

use gateway_config::ServerConfig;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{routes::create_router, state::AppState};

/// Server startup or runtime failure
#[derive(Debug, Error)]
pub enum ServerError {
    /// Host and port do not form a socket address
    #[error("Invalid listen address {address}: {message}")]
    InvalidAddress {
        /// Offending address
        address: String,
        /// Parse failure
        message: String,
    },

    /// Bind or serve failure
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server bound to the configured address
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a server
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Address the server listens on
    ///
    /// # Errors
    /// Returns an error if host and port do not parse
    pub fn address(&self) -> Result<SocketAddr, ServerError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        address
            .parse()
            .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                message: e.to_string(),
                address,
            })
    }

    /// Serve until ctrl-c
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound or serving fails
    pub async fn run(self) -> Result<(), ServerError> {
        let address = self.address()?;
        let listener = TcpListener::bind(address).await?;
        info!(address = %address, "Gateway listening");

        axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_providers::ProviderRegistry;

    fn state() -> AppState {
        AppState::builder()
            .providers(ProviderRegistry::new())
            .build()
            .expect("state")
    }

    #[test]
    fn test_address() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..ServerConfig::default()
        };
        let server = Server::new(config, state());
        assert_eq!(server.address().expect("parses").port(), 8080);
    }

    #[test]
    fn test_invalid_address() {
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        let err = Server::new(config, state()).address().expect_err("rejected");
        assert!(matches!(err, ServerError::InvalidAddress { .. }));
    }
}
