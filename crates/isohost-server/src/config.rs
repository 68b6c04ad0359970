//! Server configuration
//!
//! Loaded from a TOML file and overridden by `ISOHOST_*` environment
//! variables:
//!
//! ```toml
//! [host]
//! addr = "127.0.0.1:0"
//!
//! [engine]
//! address = "./data/engine"
//!
//! [install]
//! scripts_dir = "./scripts"
//! apply_hotfix = true
//!
//! [isolation]
//! catalog_prefix = "ISO_TEST_"
//!
//! [platform]
//! TestLicenseKey = "DOMAIN:localhost"
//! ```

use crate::error::{HostError, Result};
use isohost_core::admin::InstallSettings;
use isohost_core::config::{ConfigStore, keys};
use isohost_core::descriptor::EngineDescriptor;
use isohost_core::identity::DEFAULT_CATALOG_PREFIX;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listener
    pub host: HostConfig,
    /// Database engine
    pub engine: EngineConfig,
    /// Baseline installation
    pub install: InstallConfig,
    /// Per-run isolation
    pub isolation: IsolationConfig,
    /// Initial platform configuration values
    pub platform: BTreeMap<String, String>,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Bind address; port 0 picks a free port
    pub addr: SocketAddr,
    /// Upper bound on draining connections during stop
    pub shutdown_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine address (the engine data directory)
    pub address: String,
    /// How long a catalog drop waits for open handles
    pub release_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: "./data/engine".to_string(),
            release_timeout_ms: 5_000,
        }
    }
}

/// Baseline installation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Script directory; the embedded baseline is used when unset
    pub scripts_dir: Option<PathBuf>,
    /// Apply `hotfix/*.sql` after the main scripts
    pub apply_hotfix: bool,
}

/// Isolation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Prefix of generated catalog names
    pub catalog_prefix: String,
    /// Pause after each stop before the next host may start
    pub artificial_delay_ms: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            catalog_prefix: DEFAULT_CATALOG_PREFIX.to_string(),
            artificial_delay_ms: 1_500,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str::<ServerConfig>(&content)
            .map_err(|e| HostError::config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration from `ISOHOST_CONFIG` (if set) and environment
    /// Priority: environment variables > config file > defaults
    pub fn from_env() -> Result<Self> {
        let config = match std::env::var("ISOHOST_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `ISOHOST_*` overrides read through `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(addr) = lookup("ISOHOST_ADDR") {
            self.host.addr = addr
                .parse()
                .map_err(|_| HostError::config(format!("Invalid ISOHOST_ADDR '{}'", addr)))?;
        }
        if let Some(address) = lookup("ISOHOST_ENGINE_ADDRESS") {
            self.engine.address = address;
        }
        if let Some(dir) = lookup("ISOHOST_SCRIPTS_DIR") {
            self.install.scripts_dir = Some(PathBuf::from(dir));
        }
        if let Some(hotfix) = lookup("ISOHOST_APPLY_HOTFIX") {
            self.install.apply_hotfix = hotfix.parse::<bool>().unwrap_or(self.install.apply_hotfix);
        }
        if let Some(prefix) = lookup("ISOHOST_CATALOG_PREFIX") {
            self.isolation.catalog_prefix = prefix;
        }
        if let Some(license) = lookup("ISOHOST_LICENSE_KEY") {
            self.platform
                .insert(keys::TEST_LICENSE_KEY.to_string(), license);
        }
        if let Some(salt) = lookup("ISOHOST_HASH_SALT") {
            self.platform.insert(keys::HASH_STRING_SALT.to_string(), salt);
        }
        Ok(self)
    }

    /// Set the bind address
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.host.addr = addr;
        self
    }

    /// Set the engine address
    pub fn with_engine_address(mut self, address: impl Into<String>) -> Self {
        self.engine.address = address.into();
        self
    }

    /// Set a platform configuration value
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.platform.insert(key.into(), value.into());
        self
    }

    /// Install from a script directory
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install.scripts_dir = Some(dir.into());
        self
    }

    /// Descriptor of the configured engine
    pub fn engine_descriptor(&self) -> EngineDescriptor {
        EngineDescriptor::new(self.engine.address.clone())
    }

    /// Install settings for the configured scripts
    pub fn install_settings(&self) -> InstallSettings {
        match &self.install.scripts_dir {
            Some(dir) => InstallSettings::from_dir(dir).with_hotfix(self.install.apply_hotfix),
            None => InstallSettings::default(),
        }
    }

    /// Fresh platform configuration store seeded from `[platform]`
    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::from_pairs(self.platform.clone())
    }

    /// Drain timeout during stop
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.host.shutdown_timeout_ms)
    }

    /// Catalog drop wait
    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.release_timeout_ms)
    }

    /// Post-stop pause
    pub fn artificial_delay(&self) -> Duration {
        Duration::from_millis(self.isolation.artificial_delay_ms)
    }
}
