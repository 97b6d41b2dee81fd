//! Configuration system for PeerFlow
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/peerflow/config.toml
//! - Linux: ~/.config/peerflow/config.toml
//! - Windows: %APPDATA%/peerflow/config.toml

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Signal server settings
    pub signal: SignalConfig,
    /// Network settings
    pub network: NetworkConfig,
}

/// Signal server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Signal server port
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
    /// Path the WebSocket endpoint is served on
    pub ws_path: String,
    /// Seconds without register/heartbeat before a peer is evicted
    pub peer_timeout_secs: u64,
    /// Seconds between liveness sweeps
    pub sweep_interval_secs: u64,
    /// Origins accepted when `enforce_origin` is set
    pub allowed_origins: Vec<String>,
    /// Reject upgrades whose Origin header is not allowlisted
    pub enforce_origin: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ws_path: crate::DEFAULT_WS_PATH.into(),
            peer_timeout_secs: crate::DEFAULT_PEER_TIMEOUT_SECS,
            sweep_interval_secs: crate::DEFAULT_SWEEP_INTERVAL_SECS,
            allowed_origins: vec![
                "https://peerflow.vercel.app".into(),
                "http://localhost:3000".into(),
                "http://localhost:8000".into(),
                "https://localhost:3000".into(),
            ],
            enforce_origin: false,
        }
    }
}

impl SignalConfig {
    /// Liveness sweep period
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Whether an upgrade from `origin` may proceed
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if !self.enforce_origin {
            return true;
        }
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
            None => false,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Frames queued per channel before a send counts as failed
    pub outbound_queue: usize,
    /// Maximum accepted text frame size in bytes
    pub max_frame_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            outbound_queue: crate::DEFAULT_OUTBOUND_QUEUE,
            max_frame_bytes: 1024 * 1024, // 1 MB
        }
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("app", "peerflow", "peerflow")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.signal.port, 8000);
        assert_eq!(config.signal.ws_path, "/ws");
        assert_eq!(config.signal.peer_timeout_secs, 30);
        assert_eq!(config.signal.sweep_interval_secs, 10);
        assert_eq!(config.network.outbound_queue, 64);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [signal]
            port = 9000
            peer_timeout_secs = 45
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.signal.port, 9000);
        assert_eq!(config.signal.peer_timeout_secs, 45);
        // Other values should be defaults
        assert_eq!(config.signal.sweep_interval_secs, 10);
        assert_eq!(config.network.outbound_queue, 64);
    }

    #[test]
    fn test_sample_config() {
        let sample = Config::sample();
        assert!(sample.contains("[signal]"));
        assert!(sample.contains("[network]"));
        assert!(sample.contains("peerflow.vercel.app"));
    }

    #[test]
    fn test_config_load_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.signal.port, 8000);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.signal.enforce_origin = true;
        config.signal.allowed_origins = vec!["https://example.test".into()];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.signal.enforce_origin);
        assert_eq!(loaded.signal.allowed_origins, vec!["https://example.test"]);
    }

    #[test]
    fn test_config_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[signal\nport = ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_origin_policy() {
        let mut signal = SignalConfig::default();
        assert!(signal.origin_allowed(None));
        assert!(signal.origin_allowed(Some("https://evil.test")));

        signal.enforce_origin = true;
        assert!(signal.origin_allowed(Some("https://peerflow.vercel.app")));
        assert!(!signal.origin_allowed(Some("https://evil.test")));
        assert!(!signal.origin_allowed(None));
    }
}
