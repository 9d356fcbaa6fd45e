//! Node configuration with TOML file support.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use murmur_network::{PeerTimeouts, PoolConfig};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a murmur node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Port to listen on; 0 picks an ephemeral port.
    #[serde(default)]
    pub port: u16,

    /// Host to bind, dial and advertise.
    #[serde(default = "default_host")]
    pub host: String,

    /// Ports of seed nodes to dial on startup.
    #[serde(default)]
    pub seeds: Vec<u16>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Silence after which a peer is dropped.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Keepalive ping period; 0 disables pings.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Dial attempts per seed, including the first.
    #[serde(default = "default_seed_retry_attempts")]
    pub seed_retry_attempts: u32,

    #[serde(default = "default_seed_retry_delay_ms")]
    pub seed_retry_delay_ms: u64,

    #[serde(default = "default_max_inbound")]
    pub max_inbound: usize,

    #[serde(default = "default_max_outbound")]
    pub max_outbound: usize,

    /// Window of remembered packet ids; unset keeps them all.
    #[serde(default)]
    pub dedup_capacity: Option<usize>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_ping_interval_ms() -> u64 {
    15_000
}

fn default_seed_retry_attempts() -> u32 {
    4
}

fn default_seed_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_inbound() -> usize {
    64
}

fn default_max_outbound() -> usize {
    16
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// Reject values the pool cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.host.is_empty() {
            return Err(NodeError::Config("host must not be empty".into()));
        }
        if self.seed_retry_attempts == 0 {
            return Err(NodeError::Config("seed_retry_attempts must be at least 1".into()));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
        ] {
            if value == 0 {
                return Err(NodeError::Config(format!("{name} must be positive")));
            }
        }
        if self.dedup_capacity == Some(0) {
            return Err(NodeError::Config("dedup_capacity must be positive".into()));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    /// Pool parameters with durations resolved.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            host: self.host.clone(),
            seeds: self.seeds.clone(),
            timeouts: PeerTimeouts {
                connect: Duration::from_millis(self.connect_timeout_ms),
                handshake: Duration::from_millis(self.handshake_timeout_ms),
                idle: Duration::from_millis(self.idle_timeout_ms),
            },
            ping_interval: (self.ping_interval_ms > 0)
                .then(|| Duration::from_millis(self.ping_interval_ms)),
            seed_retry_attempts: self.seed_retry_attempts,
            seed_retry_delay: Duration::from_millis(self.seed_retry_delay_ms),
            max_inbound: self.max_inbound,
            max_outbound: self.max_outbound,
            dedup_capacity: self.dedup_capacity,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 0,
            host: default_host(),
            seeds: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            seed_retry_attempts: default_seed_retry_attempts(),
            seed_retry_delay_ms: default_seed_retry_delay_ms(),
            max_inbound: default_max_inbound(),
            max_outbound: default_max_outbound(),
            dedup_capacity: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
