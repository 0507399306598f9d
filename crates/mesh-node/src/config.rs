// ABOUTME: Configuration loading for the collector daemon
// ABOUTME: TOML file with defaulted sections, overridden by command-line flags

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity and listener of this collector
    pub collector: CollectorConfig,
    /// Peers and per-call timeouts
    pub peers: PeersConfig,
    /// Service catalog and call gating
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Collector ID (defaults to a random UUID per run)
    pub id: Option<String>,
    /// gRPC listen address
    pub listen_addr: String,
    /// Address peers use to reach us (defaults to http://<listen_addr>)
    pub advertise_address: Option<String>,
    /// Namespaces this collector participates in
    pub namespaces: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            id: None,
            listen_addr: "127.0.0.1:50061".to_string(),
            advertise_address: None,
            namespaces: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Peer addresses dialed at startup
    pub bootstrap: Vec<String>,
    /// Dial timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-forward timeout in seconds; 0 leaves only the caller's deadline
    pub forward_timeout_secs: u64,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            bootstrap: Vec::new(),
            connect_timeout_secs: 10,
            forward_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Host RegistryService on this collector
    pub enabled: bool,
    /// Registry hosted by another collector, used when `enabled` is false
    pub remote: Option<String>,
    /// Check Serve calls against the registry before running handlers
    pub validate_serve: bool,
    /// Gate every inbound DispatchService RPC through the registry
    pub intercept_calls: bool,
    /// Namespace the interceptor validates against (defaults to the first collector namespace)
    pub namespace: Option<String>,
    pub backend: RegistryBackend,
    /// SQLite file for the sqlite backend
    pub db_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote: None,
            validate_serve: false,
            intercept_calls: false,
            namespace: None,
            backend: RegistryBackend::Memory,
            db_path: None,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub id: Option<String>,
    pub listen_addr: Option<String>,
    pub advertise_address: Option<String>,
    pub namespaces: Vec<String>,
    pub peers: Vec<String>,
}

impl Config {
    /// Get the XDG config directory for the mesh (~/.config/mesh)
    pub fn config_dir() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|p| p.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("mesh")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("collector.toml")
    }

    /// Load config from the default path, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    /// Apply command-line overrides. List flags replace the file's lists when given.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(id) = overrides.id {
            self.collector.id = Some(id);
        }
        if let Some(listen_addr) = overrides.listen_addr {
            self.collector.listen_addr = listen_addr;
        }
        if let Some(advertise) = overrides.advertise_address {
            self.collector.advertise_address = Some(advertise);
        }
        if !overrides.namespaces.is_empty() {
            self.collector.namespaces = overrides.namespaces;
        }
        if !overrides.peers.is_empty() {
            self.peers.bootstrap = overrides.peers;
        }
    }

    /// Reject combinations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.collector.listen_addr.trim().is_empty() {
            bail!("collector.listen_addr must not be empty");
        }
        if matches!(self.collector.id.as_deref(), Some("")) {
            bail!("collector.id must not be empty when set");
        }
        let gated = self.registry.validate_serve || self.registry.intercept_calls;
        if gated && !self.registry.enabled && self.registry.remote.is_none() {
            bail!("registry validation needs either registry.enabled or registry.remote");
        }
        if self.registry.intercept_calls && self.interceptor_namespace().is_none() {
            bail!("registry.intercept_calls needs registry.namespace or a collector namespace");
        }
        Ok(())
    }

    /// Collector ID, generating one if none is configured
    pub fn collector_id(&self) -> String {
        self.collector
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Address announced to peers
    pub fn advertise_address(&self) -> String {
        self.collector
            .advertise_address
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.collector.listen_addr))
    }

    pub fn interceptor_namespace(&self) -> Option<String> {
        self.registry
            .namespace
            .clone()
            .or_else(|| self.collector.namespaces.first().cloned())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.peers.connect_timeout_secs)
    }

    pub fn forward_timeout(&self) -> Option<Duration> {
        match self.peers.forward_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Get the registry database path, using default if not configured
    pub fn registry_db_path(&self) -> PathBuf {
        self.registry
            .db_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("registry.db"))
    }

    /// Generate a default config file content
    pub fn default_toml() -> String {
        r#"# mesh collector configuration
# Location: ~/.config/mesh/collector.toml

[collector]
# id = "collector-a"                          # Random UUID per run when unset
listen_addr = "127.0.0.1:50061"
# advertise_address = "http://127.0.0.1:50061"  # Defaults to http://<listen_addr>
namespaces = []

[peers]
bootstrap = []
connect_timeout_secs = 10
forward_timeout_secs = 0                       # 0 = only the caller's deadline

[registry]
enabled = true
# remote = "http://127.0.0.1:50062"            # Registry on another collector
validate_serve = false
intercept_calls = false
# namespace = "alpha"                          # Defaults to the first collector namespace
backend = "memory"                             # "memory" or "sqlite"
# db_path = "~/.config/mesh/registry.db"
"#
        .to_string()
    }
}
