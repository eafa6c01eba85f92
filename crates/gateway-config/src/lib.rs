//! # Gateway Config
//!
//! Configuration for the chat gateway: typed sections with defaults, an
//! optional YAML or TOML file, and environment overrides.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    CacheConfig, DuckDuckGoConfig, GatewayConfig, HttpConfig, LogFormat, LoggingSettings,
    PollinationsConfig, ServerConfig, StoreConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_PATH_ENV};
pub use secrecy::{ExposeSecret, SecretString};
