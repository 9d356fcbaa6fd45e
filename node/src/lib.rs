//! murmur node.
//!
//! Wraps a [`PeerPool`](murmur_network::PeerPool) with a random node
//! identity, file-based configuration and log setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::{Node, NodeHandle};

pub use murmur_network::{PeerInfo, PeerKey, PoolEvent};
