//! Per-connection peer state machine.
//!
//! A [`Peer`] owns one transport, one [`BufferParser`] and a set of
//! deadline timers. It never performs I/O on its own: the pool feeds it
//! transport events and clock ticks, and drains the [`PeerEvent`]s it queues
//! in response. Events are delivered in the order they were raised.
//!
//! Lifecycle:
//!
//! ```text
//! Pending -> Connecting -> Connected -> Handshaking -> Handshaked
//!                 \             \             \            \
//!                  +-------------+-------------+------------+--> Destroyed
//! ```
//!
//! Inbound peers start in `Connected`, with the handshake deadline armed.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use murmur_protocol::{Body, BufferParser, Packet, PeerRecord};
use murmur_types::NodeId;

use crate::dedup::FilterHandle;
use crate::timer::Timer;
use crate::transport::{Transport, TransportEvent};
use crate::NetworkError;

/// Pool-local handle naming one peer for its whole life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerKey(pub u64);

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    Pending,
    Connecting,
    Connected,
    Handshaking,
    Handshaked,
    Destroyed,
}

/// Raised by a peer, consumed by the pool.
#[derive(Debug)]
pub enum PeerEvent {
    /// Outbound connect succeeded.
    Connect,
    /// The remote identified itself.
    Handshake { outbound: bool },
    /// A fresh packet from a handshaked peer.
    Packet(Packet),
    Error(NetworkError),
    /// Last lifecycle event of a peer. Only a `DestroyedPeer` error, raised
    /// when a packet is handed to a destroyed peer, can follow it.
    Close { was_connected: bool },
}

/// Deadlines applied to every peer.
#[derive(Clone, Copy, Debug)]
pub struct PeerTimeouts {
    pub connect: Duration,
    pub handshake: Duration,
    pub idle: Duration,
}

impl Default for PeerTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(2_000),
            handshake: Duration::from_millis(5_000),
            idle: Duration::from_millis(60_000),
        }
    }
}

/// What the pool knows about a handshaked neighbour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub key: PeerKey,
    pub node_id: NodeId,
    pub host: String,
    pub port: u32,
    pub outbound: bool,
}

pub struct Peer {
    key: PeerKey,
    outbound: bool,
    connected: bool,
    destroyed: bool,
    handshaked: bool,
    handshake_sent: bool,
    /// Dialed port for outbound peers, advertised port once handshaked.
    port: u32,
    remote: Option<PeerRecord>,
    filter: FilterHandle,
    parser: BufferParser,
    transport: Option<Box<dyn Transport>>,
    connect_timer: Timer,
    handshake_timer: Timer,
    idle_timer: Timer,
    events: VecDeque<PeerEvent>,
}

impl Peer {
    fn new(key: PeerKey, outbound: bool, port: u32, filter: FilterHandle, timeouts: PeerTimeouts) -> Self {
        Self {
            key,
            outbound,
            connected: false,
            destroyed: false,
            handshaked: false,
            handshake_sent: false,
            port,
            remote: None,
            filter,
            parser: BufferParser::new(),
            transport: None,
            connect_timer: Timer::new(timeouts.connect),
            handshake_timer: Timer::new(timeouts.handshake),
            idle_timer: Timer::new(timeouts.idle),
            events: VecDeque::new(),
        }
    }

    /// A peer we are about to dial on `port`.
    pub fn outbound(key: PeerKey, port: u16, filter: FilterHandle, timeouts: PeerTimeouts) -> Self {
        Self::new(key, true, u32::from(port), filter, timeouts)
    }

    /// A peer wrapping a freshly accepted stream.
    pub fn inbound(
        key: PeerKey,
        transport: Box<dyn Transport>,
        filter: FilterHandle,
        timeouts: PeerTimeouts,
        now: Instant,
    ) -> Self {
        let mut peer = Self::new(key, false, 0, filter, timeouts);
        peer.connected = true;
        peer.transport = Some(transport);
        peer.handshake_timer.start(now);
        peer.idle_timer.start(now);
        peer
    }

    pub fn key(&self) -> PeerKey {
        self.key
    }

    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_handshaked(&self) -> bool {
        self.handshaked
    }

    pub fn handshake_sent(&self) -> bool {
        self.handshake_sent
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn remote(&self) -> Option<&PeerRecord> {
        self.remote.as_ref()
    }

    pub fn state(&self) -> PeerState {
        if self.destroyed {
            PeerState::Destroyed
        } else if self.handshaked {
            PeerState::Handshaked
        } else if self.connected && (self.handshake_sent || self.handshake_timer.running()) {
            PeerState::Handshaking
        } else if self.connected {
            PeerState::Connected
        } else if self.connect_timer.running() {
            PeerState::Connecting
        } else {
            PeerState::Pending
        }
    }

    /// Neighbour summary, once the remote has identified itself.
    pub fn info(&self) -> Option<PeerInfo> {
        let remote = self.remote.as_ref()?;
        Some(PeerInfo {
            key: self.key,
            node_id: remote.peer_id.clone(),
            host: remote.host.clone(),
            port: remote.port,
            outbound: self.outbound,
        })
    }

    pub fn next_event(&mut self) -> Option<PeerEvent> {
        self.events.pop_front()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Arm the connect deadline before dialing.
    pub fn begin_connect(&mut self, now: Instant) {
        debug_assert!(self.outbound, "only outbound peers dial");
        self.connect_timer.start(now);
    }

    /// The dial for this peer produced a stream.
    pub fn connected(&mut self, transport: Box<dyn Transport>, now: Instant) {
        if self.destroyed {
            let mut transport = transport;
            transport.destroy();
            return;
        }
        assert!(self.transport.is_none(), "transport already bound");
        self.connect_timer.clear();
        self.connected = true;
        self.transport = Some(transport);
        self.idle_timer.restart(now);
        self.events.push_back(PeerEvent::Connect);
    }

    /// The dial for this peer failed.
    pub fn connect_failed(&mut self, error: NetworkError) {
        if self.destroyed {
            return;
        }
        self.connect_timer.clear();
        self.error(error);
        self.destroy();
    }

    /// Send our handshake and, on outbound peers, (re)arm the handshake
    /// deadline.
    pub fn handshake(&mut self, record: PeerRecord, now: Instant) -> Result<(), NetworkError> {
        self.send(&Packet::handshake(record))?;
        self.handshake_sent = true;
        if self.outbound {
            self.handshake_timer.restart(now);
        }
        Ok(())
    }

    /// Originate a packet on this peer.
    ///
    /// The packet id is recorded in the shared filter so an echo of it is
    /// never surfaced.
    pub fn send(&mut self, packet: &Packet) -> Result<(), NetworkError> {
        debug_assert!(
            !self.filter.contains(&packet.id),
            "packet {} already seen",
            packet.id
        );
        self.filter.insert(packet.id);
        let frame = packet.encode()?;
        self.write(frame)
    }

    /// Write an already-encoded frame. A failed write destroys the peer.
    pub fn write(&mut self, frame: Vec<u8>) -> Result<(), NetworkError> {
        if !self.connected {
            return Err(NetworkError::NotConnected);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(NetworkError::NotConnected);
        };
        if let Err(e) = transport.write(frame) {
            tracing::debug!(peer = %self.key, error = %e, "write failed");
            self.error(NetworkError::Io(e.to_string()));
            self.destroy();
            return Err(e);
        }
        Ok(())
    }

    pub fn on_transport(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Data(bytes) => self.on_data(&bytes, now),
            TransportEvent::Close => {
                tracing::debug!(peer = %self.key, "remote closed");
                self.destroy();
            }
            TransportEvent::Error(e) => {
                self.error(NetworkError::Io(e));
                self.destroy();
            }
        }
    }

    /// Feed raw stream bytes through the parser.
    pub fn on_data(&mut self, bytes: &[u8], now: Instant) {
        let mut packets = Vec::new();
        let result = self.parser.feed(bytes, &mut packets);
        for packet in packets {
            self.handle_packet(packet, now);
        }
        if let Err(e) = result {
            self.error(e.into());
            self.destroy();
        }
    }

    /// Apply one decoded packet.
    pub fn handle_packet(&mut self, packet: Packet, now: Instant) {
        if self.destroyed {
            self.error(NetworkError::DestroyedPeer);
            self.destroy();
            return;
        }

        self.idle_timer.restart(now);

        if !self.filter.insert(packet.id) {
            tracing::trace!(peer = %self.key, id = %packet.id, "duplicate packet dropped");
            return;
        }

        if let Body::Handshake(record) = packet.body {
            self.on_handshake(record);
            return;
        }

        if !self.handshaked {
            tracing::debug!(
                peer = %self.key,
                kind = %packet.kind(),
                "dropping packet from peer that has not handshaked"
            );
            return;
        }

        self.events.push_back(PeerEvent::Packet(packet));
    }

    fn on_handshake(&mut self, record: PeerRecord) {
        if self.handshaked {
            tracing::debug!(peer = %self.key, "repeated handshake ignored");
            return;
        }
        if self.outbound && record.port != self.port {
            self.error(NetworkError::PortMismatch {
                expected: self.port,
                got: record.port,
            });
        }

        tracing::debug!(
            peer = %self.key,
            node = %record.peer_id,
            host = %record.host,
            port = record.port,
            "handshake received"
        );
        self.port = record.port;
        self.remote = Some(record);
        self.handshaked = true;
        self.handshake_timer.clear();
        self.events.push_back(PeerEvent::Handshake {
            outbound: self.outbound,
        });
    }

    /// Fire every expired deadline.
    pub fn poll_timers(&mut self, now: Instant) {
        if self.connect_timer.fire(now) {
            self.connect_failed(NetworkError::ConnectTimeout { port: self.port });
        }
        if self.handshake_timer.fire(now) {
            tracing::debug!(peer = %self.key, outbound = self.outbound, "handshake deadline passed");
            self.error(NetworkError::HandshakeTimeout);
            self.destroy();
        }
        if self.idle_timer.fire(now) {
            tracing::debug!(peer = %self.key, "liveness deadline passed");
            self.error(NetworkError::IdleTimeout);
            self.destroy();
        }
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.connect_timer.deadline(),
            self.handshake_timer.deadline(),
            self.idle_timer.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Tear the peer down. Idempotent; queues `Close` exactly once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.connect_timer.clear();
        self.handshake_timer.clear();
        self.idle_timer.clear();

        let was_connected = self.connected;
        self.destroyed = true;
        self.connected = false;
        if let Some(transport) = self.transport.as_mut() {
            transport.destroy();
        }
        self.events.push_back(PeerEvent::Close { was_connected });
    }

    fn error(&mut self, error: NetworkError) {
        self.events.push_back(PeerEvent::Error(error));
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("outbound", &self.outbound)
            .field("port", &self.port)
            .finish()
    }
}
