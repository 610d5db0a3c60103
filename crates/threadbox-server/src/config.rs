//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file
//! - Environment variables (THREADBOX_*, nested keys joined with `__`)

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Files searched by [`Config::load`], first match wins.
const CONFIG_PATHS: [&str; 3] = [
    "threadbox.toml",
    "/etc/threadbox/threadbox.toml",
    "~/.config/threadbox/threadbox.toml",
];

/// Environment variable prefix.
const ENV_PREFIX: &str = "THREADBOX";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Ingestion configuration.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Notification surface configuration.
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum payload size in bytes.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Deliveries buffered between the HTTP endpoint and the router.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Notification surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// How often router gauges are sampled, in milliseconds.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_payload_size() -> usize {
    256 * 1024 // 256 KB
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_sample_interval() -> u64 {
    5_000 // 5 seconds
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ingest: IngestConfig::default(),
            notifications: NotificationsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_payload_size: default_max_payload_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            sample_interval_ms: default_sample_interval(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, with
    /// environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file or environment value cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = Self::find_file() {
            tracing::info!("Loading config from {}", path.display());
            builder = builder.add_source(::config::File::from(path.as_path()));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize::<Config>()
            .context("Invalid configuration")?
            .validated()
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validated()
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Reject values the server cannot start with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.ingest.queue_capacity > 0,
            "ingest.queue_capacity must be greater than zero"
        );
        ensure!(
            self.ingest.max_payload_size > 0,
            "ingest.max_payload_size must be greater than zero"
        );
        ensure!(
            self.notifications.websocket_path.starts_with('/'),
            "notifications.websocket_path must start with '/'"
        );
        ensure!(
            self.metrics.sample_interval_ms > 0,
            "metrics.sample_interval_ms must be greater than zero"
        );
        Ok(self)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    fn find_file() -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
            .find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.notifications.websocket_path, "/ws");
        assert_eq!(config.ingest.max_payload_size, 256 * 1024);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [ingest]
            queue_capacity = 16

            [metrics]
            enabled = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.ingest.queue_capacity, 16);
        assert_eq!(config.ingest.max_payload_size, 256 * 1024);
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_config_rejects_zero_queue_capacity() {
        let config: Config = toml::from_str("[ingest]\nqueue_capacity = 0").unwrap();
        let err = config.validated().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));

        assert!(Config::default().validated().is_ok());
    }

    #[test]
    fn test_config_file_is_validated() {
        let path = std::env::temp_dir().join(format!(
            "threadbox-config-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[ingest]\nqueue_capacity = 0\n").unwrap();

        let result = Config::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_relative_ws_path() {
        let config = Config {
            notifications: NotificationsConfig {
                websocket_path: "ws".to_string(),
            },
            ..Config::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_config_from_missing_file() {
        assert!(Config::from_file("/nonexistent/threadbox.toml").is_err());
    }
}
