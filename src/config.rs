//! Configuration loading.
//!
//! The proxy reads a single YAML file selected by the `CONFIG_PATH`
//! environment variable (default `config/development.yaml`). A `.env` file in
//! the working directory is loaded first when present; its absence is normal.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Default config file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "config/development.yaml";

/// Top-level configuration record.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
}

/// The `server:` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address. An IPv4 literal, or empty for all interfaces.
    #[serde(default)]
    pub address: String,

    /// Listen port, required.
    pub port: u16,

    /// Informational only; the reactor always uses epoll readiness.
    #[serde(default)]
    pub async_method: String,

    /// Load-balancing policy name. `round_robin` is the only one supported.
    pub load_balancer: String,

    /// Upstream server URLs. At least one is required.
    #[serde(default)]
    pub upstream_servers: Vec<String>,
}

impl Config {
    /// Loads configuration from `CONFIG_PATH` (or the default path).
    ///
    /// A `.env` file is applied to the environment first so `CONFIG_PATH`
    /// itself may come from it.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not valid YAML, or fails
    /// validation. Startup aborts on any of these.
    pub fn load() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            tracing::info!(error = %err, "No .env file loaded");
        }

        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_file(&path)
    }

    /// Loads and validates configuration from an explicit path.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port is required and must be in 1..65535");
        }
        if self.server.upstream_servers.is_empty() {
            bail!("at least one upstream server is required");
        }
        Ok(())
    }
}
