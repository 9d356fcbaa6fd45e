//! Gossip networking for murmur.
//!
//! Peers exchange framed packets over ordered byte streams. Each connection
//! is a [`Peer`] state machine owned by a [`PeerPool`], which floods Data
//! packets to every neighbour and suppresses duplicates through a shared
//! [`FilterHandle`].

pub mod broadcast;
pub mod config;
pub mod dedup;
pub mod error;
pub mod peer;
pub mod pool;
pub mod timer;
pub mod transport;

pub use broadcast::BroadcastResult;
pub use config::PoolConfig;
pub use dedup::{DuplicateFilter, FilterHandle};
pub use error::NetworkError;
pub use peer::{Peer, PeerEvent, PeerInfo, PeerKey, PeerState, PeerTimeouts};
pub use pool::{PeerPool, PoolEvent, PoolHandle, PoolRequest};
pub use timer::Timer;
pub use transport::{Listener, Network, StreamTransport, TcpNetwork, Transport, TransportEvent};
