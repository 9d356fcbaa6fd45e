//! Flood propagation.
//!
//! Every frame is written to every handshaked neighbour except the one it
//! came from. Loops are cut by the shared duplicate filter, not by routing:
//! a node that already saw the packet id drops the copy.

use std::collections::BTreeMap;

use crate::peer::{Peer, PeerKey};

/// Outcome of a flood.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Peers the frame was queued for.
    pub sent: usize,
    /// Peers whose write failed; each of them is destroyed.
    pub failed: usize,
}

/// Write `frame` to all handshaked peers other than `except`.
///
/// Peers that have not identified themselves are skipped: they would record
/// the id in their own filter while dropping the payload, losing it for good.
pub fn flood(peers: &mut BTreeMap<PeerKey, Peer>, frame: &[u8], except: Option<PeerKey>) -> BroadcastResult {
    let mut result = BroadcastResult::default();

    for (key, peer) in peers.iter_mut() {
        if Some(*key) == except || !peer.is_handshaked() || !peer.is_connected() {
            continue;
        }
        match peer.write(frame.to_vec()) {
            Ok(()) => result.sent += 1,
            Err(_) => result.failed += 1,
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::FilterHandle;
    use crate::peer::PeerTimeouts;
    use crate::transport::Transport;
    use crate::NetworkError;
    use murmur_protocol::{Packet, PeerRecord};
    use murmur_types::NodeId;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    struct Sink {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        broken: bool,
    }

    impl Transport for Sink {
        fn write(&mut self, frame: Vec<u8>) -> Result<(), NetworkError> {
            if self.broken {
                return Err(NetworkError::Io("broken pipe".into()));
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        fn destroy(&mut self) {}
    }

    fn peer(n: u64, sink: &Sink, handshake: bool) -> Peer {
        let mut peer = Peer::inbound(
            PeerKey(n),
            Box::new(sink.clone()),
            FilterHandle::default(),
            PeerTimeouts::default(),
            Instant::now(),
        );
        if handshake {
            let hello = Packet::handshake(PeerRecord::new(
                n as u16,
                "localhost",
                NodeId::new(vec![n as u8]),
            ));
            peer.on_data(&hello.encode().unwrap(), Instant::now());
        }
        while peer.next_event().is_some() {}
        peer
    }

    #[test]
    fn floods_all_handshaked_except_origin() {
        let sinks: Vec<Sink> = (0..4).map(|_| Sink::default()).collect();
        let mut peers = BTreeMap::new();
        peers.insert(PeerKey(0), peer(0, &sinks[0], true));
        peers.insert(PeerKey(1), peer(1, &sinks[1], true));
        peers.insert(PeerKey(2), peer(2, &sinks[2], false));
        peers.insert(PeerKey(3), peer(3, &sinks[3], true));

        let result = flood(&mut peers, b"frame", Some(PeerKey(1)));
        assert_eq!(result, BroadcastResult { sent: 2, failed: 0 });

        let counts: Vec<usize> = sinks.iter().map(|s| s.frames.lock().unwrap().len()).collect();
        assert_eq!(counts, vec![1, 0, 0, 1]);
    }

    #[test]
    fn failed_write_destroys_peer() {
        let good = Sink::default();
        let bad = Sink {
            broken: true,
            ..Sink::default()
        };
        let mut peers = BTreeMap::new();
        peers.insert(PeerKey(0), peer(0, &good, true));
        peers.insert(PeerKey(1), peer(1, &bad, true));

        let result = flood(&mut peers, b"frame", None);
        assert_eq!(result, BroadcastResult { sent: 1, failed: 1 });
        assert!(peers[&PeerKey(1)].is_destroyed());
        assert!(!peers[&PeerKey(0)].is_destroyed());
    }
}
