//! Application configuration loaded from environment variables.
//!
//! Fail-fast: the process exits with a clear message when a required value
//! is missing or malformed.

use std::net::SocketAddr;

use phonebook_directory::{DirectoryConfig, DirectoryError};
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "info,phonebook=debug";

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Directory configuration: {0}")]
    Directory(#[from] DirectoryError),
}

/// Server settings plus the directory settings it serves.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Bearer token that unlocks imports and mutations. Unset disables them.
    pub api_token: Option<String>,
    pub log_filter: String,
    pub directory: DirectoryConfig,
}

impl ServerConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_addr = get("PHONEBOOK_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = raw_addr.parse().map_err(|e| ConfigError::InvalidValue {
            var: "PHONEBOOK_LISTEN_ADDR".to_string(),
            message: format!("'{raw_addr}': {e}"),
        })?;

        Ok(Self {
            listen_addr,
            api_token: get("PHONEBOOK_API_TOKEN"),
            log_filter: get("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            directory: DirectoryConfig::from_lookup(&lookup)?,
        })
    }
}
