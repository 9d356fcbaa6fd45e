use std::time::Duration;

use crate::peer::PeerTimeouts;

/// Runtime parameters of a [`PeerPool`](crate::PeerPool).
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Host to bind, dial seeds on, and advertise in handshakes.
    pub host: String,
    /// Ports of seed nodes dialed after listening starts.
    pub seeds: Vec<u16>,
    pub timeouts: PeerTimeouts,
    /// Keepalive ping period; `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// Total dial attempts per seed, including the first.
    pub seed_retry_attempts: u32,
    pub seed_retry_delay: Duration,
    pub max_inbound: usize,
    pub max_outbound: usize,
    /// Duplicate filter window; `None` keeps every id forever.
    pub dedup_capacity: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            seeds: Vec::new(),
            timeouts: PeerTimeouts::default(),
            ping_interval: Some(Duration::from_secs(15)),
            seed_retry_attempts: 4,
            seed_retry_delay: Duration::from_secs(1),
            max_inbound: 64,
            max_outbound: 16,
            dedup_capacity: None,
        }
    }
}
