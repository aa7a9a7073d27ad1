//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Main service configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Root of the per-model storage directories
    pub models_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            models_dir: default_models_dir(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(host) = std::env::var("LOGPROMPT_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("LOGPROMPT_PORT") {
            config.port = port.parse().context("Invalid LOGPROMPT_PORT value")?;
        }
        if let Ok(models_dir) = std::env::var("LOGPROMPT_MODELS_DIR") {
            config.models_dir = PathBuf::from(models_dir);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port must be non-zero");
        }

        if self.host.is_empty() {
            anyhow::bail!("Host cannot be empty");
        }
        self.host
            .parse::<IpAddr>()
            .with_context(|| format!("Host '{}' is not a valid IP address", self.host))?;

        if self.models_dir.as_os_str().is_empty() {
            anyhow::bail!("Models directory cannot be empty");
        }
        if self.models_dir.exists() && !self.models_dir.is_dir() {
            anyhow::bail!("Models path {:?} is not a directory", self.models_dir);
        }

        // Ensure the models directory exists or can be created
        if !self.models_dir.exists() {
            std::fs::create_dir_all(&self.models_dir).with_context(|| {
                format!("Cannot create models directory: {:?}", self.models_dir)
            })?;
        }

        Ok(())
    }

    /// Socket address the API binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Host '{}' is not a valid IP address", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

// Default functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}
