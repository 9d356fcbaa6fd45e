//! Fundamental types for the murmur gossip network.
//!
//! This crate defines the identifiers and timestamps shared across every
//! other crate in the workspace: packet ids, node ids and wall-clock
//! timestamps in epoch milliseconds.

pub mod error;
pub mod id;
pub mod time;

pub use error::TypesError;
pub use id::{NodeId, PacketId, PACKET_ID_LEN};
pub use time::Timestamp;
