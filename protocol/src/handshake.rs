//! Node handshake record.
//!
//! The handshake payload and each entry of a peer list share one layout:
//! `port:u32 | hostLen:u32 | host | peerIdLen:u32 | peerId`.

use murmur_types::NodeId;

use crate::codec::{Reader, Writer};
use crate::ProtocolError;

/// Identity a node advertises: where it listens and who it is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    /// Advertised listening port.
    pub port: u32,
    /// Advertised host, UTF-8.
    pub host: String,
    pub peer_id: NodeId,
}

impl PeerRecord {
    pub fn new(port: u16, host: impl Into<String>, peer_id: NodeId) -> Self {
        Self {
            port: u32::from(port),
            host: host.into(),
            peer_id,
        }
    }

    pub(crate) fn encode_into(&self, w: &mut Writer) {
        w.put_u32(self.port);
        w.put_str(&self.host);
        w.put_bytes(self.peer_id.as_bytes());
    }

    pub(crate) fn decode_from(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let port = r.u32("port")?;
        let host = r.str("host")?;
        let peer_id = NodeId::new(r.bytes("peer id")?.to_vec());
        Ok(Self {
            port,
            host,
            peer_id,
        })
    }
}
