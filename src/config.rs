//! WolfKV Configuration
//!
//! This module provides configuration structures for a WolfKV node. Every
//! section has defaults, so an empty file (or no file) is a valid single-node
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main WolfKV configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfKvConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Cluster (gossip) configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// TLS configuration
    #[serde(default)]
    pub tls: TlsConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address to bind for client and peer calls
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Address peers use to reach this node, if it differs from the bind address
    #[serde(default)]
    pub advertise_address: Option<String>,
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Peer addresses to gossip with (host:port)
    #[serde(default)]
    pub peers: Vec<String>,

    /// Dial peers over TLS
    #[serde(default)]
    pub secure: bool,

    /// Interval between gossip attempts in milliseconds
    #[serde(default = "default_gossip_interval_ms")]
    pub gossip_interval_ms: u64,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Timeout for one whole gossip call in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// TLS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate chain served to callers (PEM)
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Private key for `cert_file` (PEM)
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// CA bundle trusted when dialing peers (PEM); webpki roots if unset
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:3100".to_string()
}

fn default_gossip_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            advertise_address: None,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            secure: false,
            gossip_interval_ms: default_gossip_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WolfKvConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfKvConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply command-line overrides; `port` replaces the port of the bind address
    pub fn apply_overrides(&mut self, port: Option<u16>, secure: bool, servers: Option<&str>) {
        if let Some(port) = port {
            let host = self
                .node
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.node.bind_address = format!("{}:{}", host, port);
        }
        if secure {
            self.cluster.secure = true;
        }
        if let Some(servers) = servers {
            self.cluster.peers = parse_peer_list(servers);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.cluster.gossip_interval_ms == 0 {
            return Err(crate::Error::Config("cluster.gossip_interval_ms must be positive".into()));
        }

        if let Some(peer) = self.cluster.peers.iter().find(|p| !p.contains(':')) {
            return Err(crate::Error::Config(format!(
                "cluster.peers entry {:?} must be host:port",
                peer
            )));
        }

        if self.tls.cert_file.is_some() != self.tls.key_file.is_some() {
            return Err(crate::Error::Config(
                "tls.cert_file and tls.key_file must be set together".into(),
            ));
        }

        Ok(())
    }

    /// Get the advertised address (or bind address if not set)
    pub fn advertise_address(&self) -> &str {
        self.node
            .advertise_address
            .as_deref()
            .unwrap_or(&self.node.bind_address)
    }

    /// Configured peers, excluding this node's own address
    pub fn gossip_peers(&self) -> Vec<String> {
        let own = self.advertise_address();
        self.cluster
            .peers
            .iter()
            .filter(|peer| peer.as_str() != own)
            .cloned()
            .collect()
    }

    /// Log level to run with: the command-line value if given, else `[logging] level`
    pub fn log_level<'a>(&'a self, cli_level: Option<&'a str>) -> &'a str {
        cli_level.unwrap_or(&self.logging.level)
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.connect_timeout_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.request_timeout_ms)
    }
}

/// Split a comma-separated peer list, dropping empty entries
pub fn parse_peer_list(servers: &str) -> Vec<String> {
    servers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
