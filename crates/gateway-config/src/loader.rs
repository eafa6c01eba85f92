//! Configuration loading.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. The file named by `GATEWAY_CONFIG` (`.yaml`, `.yml`, or `.toml`)
//! 3. Environment overrides

use crate::config::GatewayConfig;
use crate::error::{ConfigError, ConfigResult};
use secrecy::SecretString;
use std::path::Path;
use tracing::{debug, info};

/// Variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Load configuration from the environment and optional file, then validate.
pub async fn load_config() -> ConfigResult<GatewayConfig> {
    let mut config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => load_from_path(&path).await?,
        _ => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Parse a config file, choosing the format by extension.
pub async fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let config = match extension.as_str() {
        "yaml" | "yml" => {
            serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
        }
        "toml" => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };

    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Apply environment overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = get("GATEWAY_HOST") {
        config.server.host = host;
    }

    if let Some(port) = get("GATEWAY_PORT") {
        config.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: "GATEWAY_PORT".to_string(),
            value: port.clone(),
        })?;
    }

    if let Some(level) = get("GATEWAY_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(url) = get("REDIS_URL") {
        debug!("Persistent store configured from environment");
        config.store.url = Some(SecretString::new(url));
    }

    if let Some(proxy) = get("http_proxy").or_else(|| get("HTTPS_PROXY")) {
        config.http.proxy = Some(proxy);
    }

    if let Some(ttl) = get("GATEWAY_CACHE_TTL_SECS") {
        config.cache.ttl_secs = ttl.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: "GATEWAY_CACHE_TTL_SECS".to_string(),
            value: ttl.clone(),
        })?;
    }

    Ok(())
}
