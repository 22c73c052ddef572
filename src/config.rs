//! Configuration module for the inventory engine

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::InventoryError;

/// Top-level configuration, usually loaded from `~/.netledger.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Per-probe timeouts
    pub probe: ProbeConfig,

    /// Target expansion and fan-out limits
    pub scan: ScanLimits,

    /// Background scan worker behaviour
    pub worker: WorkerConfig,

    /// Record store location
    pub storage: StorageConfig,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

/// Timeouts for the individual probe stages, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub ping_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub banner_timeout_ms: u64,
    pub http_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    /// Hosts scanned concurrently within one scan
    pub host_concurrency: usize,

    /// Upper bound on hosts produced by a dash range
    pub max_range_hosts: usize,

    /// Upper bound on hosts produced by a CIDR target
    pub max_cidr_hosts: u64,

    /// Overrides the built-in default port list when set
    pub default_ports: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pause after a failed worker iteration
    pub idle_backoff_ms: u64,

    /// Re-enqueue sessions left pending by a previous process
    pub requeue_pending_on_start: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot file; `None` resolves to `~/.netledger/inventory.json`
    pub path: Option<PathBuf>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            scan: ScanLimits::default(),
            worker: WorkerConfig::default(),
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 2500,
            connect_timeout_ms: 4000,
            banner_timeout_ms: 3000,
            http_timeout_ms: 3000,
        }
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            host_concurrency: 20,
            max_range_hosts: 254,
            max_cidr_hosts: 65_536,
            default_ports: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: 1000,
            requeue_pending_on_start: true,
        }
    }
}

impl ProbeConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl WorkerConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

impl InventoryConfig {
    /// Set the host fan-out limit
    pub fn with_host_concurrency(mut self, host_concurrency: usize) -> Self {
        self.scan.host_concurrency = host_concurrency;
        self
    }

    /// Set the snapshot path
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.path = Some(path.into());
        self
    }

    /// Set the worker back-off
    pub fn with_idle_backoff(mut self, millis: u64) -> Self {
        self.worker.idle_backoff_ms = millis;
        self
    }

    /// Resolved snapshot path
    pub fn storage_path(&self) -> PathBuf {
        match &self.storage.path {
            Some(path) => path.clone(),
            None => {
                let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
                home_dir.join(".netledger").join("inventory.json")
            }
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| InventoryError::Config(format!("Failed to read config file: {}", e)))?;

        let config: InventoryConfig = toml::from_str(&content)
            .map_err(|e| InventoryError::Config(format!("Failed to parse TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = home_dir.join(".netledger.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.scan.host_concurrency == 0 {
            return Err(InventoryError::Config(
                "host_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.scan.max_range_hosts == 0 || self.scan.max_cidr_hosts == 0 {
            return Err(InventoryError::Config(
                "host limits must be greater than 0".to_string(),
            ));
        }

        if self.probe.ping_timeout_ms == 0 || self.probe.connect_timeout_ms == 0 {
            return Err(InventoryError::Config(
                "probe timeouts must be greater than 0".to_string(),
            ));
        }

        if let Some(ports) = &self.scan.default_ports {
            if ports.is_empty() || ports.contains(&0) {
                return Err(InventoryError::Config(
                    "default_ports must be a non-empty list of ports 1-65535".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = InventoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.host_concurrency, 20);
        assert_eq!(config.worker.idle_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: InventoryConfig = toml::from_str(
            r#"
            log_level = "debug"

            [scan]
            host_concurrency = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.scan.host_concurrency, 5);
        assert_eq!(config.scan.max_range_hosts, 254);
        assert_eq!(config.probe.connect_timeout_ms, 4000);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = InventoryConfig::default().with_host_concurrency(0);
        assert!(matches!(config.validate(), Err(InventoryError::Config(_))));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netledger.toml");
        fs::write(&path, "[worker]\nidle_backoff_ms = 250\n").unwrap();

        let config = InventoryConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.worker.idle_backoff_ms, 250);
    }

    #[test]
    fn test_explicit_storage_path() {
        let config = InventoryConfig::default().with_storage_path("/tmp/inv.json");
        assert_eq!(config.storage_path(), PathBuf::from("/tmp/inv.json"));
    }
}
