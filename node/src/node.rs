//! Node lifecycle: identity, listening, and the handle used to drive it.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;

use murmur_network::{Network, PeerInfo, PeerPool, PoolEvent, PoolHandle, TcpNetwork};
use murmur_types::{NodeId, PacketId};

use crate::{NodeConfig, NodeError};

/// A configured, not yet running node.
pub struct Node<N: Network = TcpNetwork> {
    id: NodeId,
    config: NodeConfig,
    network: N,
}

impl Node<TcpNetwork> {
    /// A TCP node with a fresh random id.
    pub fn new(config: NodeConfig) -> Self {
        Self::with_network(config, TcpNetwork)
    }
}

impl<N: Network> Node<N> {
    pub fn with_network(config: NodeConfig, network: N) -> Self {
        Self {
            id: NodeId::random(),
            config,
            network,
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Bind, dial the seeds, and run the pool on its own task.
    pub async fn start(self) -> Result<NodeHandle, NodeError> {
        self.config.validate()?;

        let (mut pool, events) = PeerPool::new(self.id.clone(), self.config.pool_config(), self.network);
        let requested = (self.config.port != 0).then_some(self.config.port);
        let addr = pool.listen(requested).await?;

        tracing::info!(
            node = %self.id,
            %addr,
            seeds = ?self.config.seeds,
            "node started"
        );

        Ok(NodeHandle {
            id: self.id,
            addr,
            events,
            pool: pool.spawn(),
            started: Instant::now(),
        })
    }
}

/// A running node.
pub struct NodeHandle {
    id: NodeId,
    addr: SocketAddr,
    events: UnboundedReceiver<PoolEvent>,
    pool: PoolHandle,
    started: Instant,
}

impl NodeHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Flood `data` to every neighbour.
    pub async fn send(&self, data: impl Into<Vec<u8>>) -> Result<PacketId, NodeError> {
        Ok(self.pool.send(data).await?)
    }

    /// Dial an extra peer, with the seed retry policy.
    pub async fn connect(&self, port: u16) -> Result<(), NodeError> {
        Ok(self.pool.connect(port).await?)
    }

    /// Handshaked neighbours.
    pub async fn peers(&self) -> Result<Vec<PeerInfo>, NodeError> {
        Ok(self.pool.peers().await?)
    }

    /// Next pool event; `None` once the pool has stopped.
    pub async fn next_event(&mut self) -> Option<PoolEvent> {
        self.events.recv().await
    }

    /// Event stream, for use inside `tokio::select!`.
    pub fn events(&mut self) -> &mut UnboundedReceiver<PoolEvent> {
        &mut self.events
    }

    pub async fn shutdown(self) {
        tracing::info!(node = %self.id, uptime = ?self.uptime(), "node stopping");
        self.pool.shutdown().await;
    }
}
