//! Peer pool: the single task that owns every peer.
//!
//! The pool binds the listening socket, dials seeds, turns accepted and
//! dialed streams into [`Peer`]s, and reacts to their events. Connection I/O
//! runs on per-stream tasks that only forward bytes into the pool's command
//! channel; every state change happens here, one command at a time.
//!
//! Applications drive a running pool through a [`PoolHandle`] and observe it
//! through the [`PoolEvent`] receiver returned by [`PeerPool::new`].

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use murmur_protocol::{Body, Packet, PeerRecord};
use murmur_types::{NodeId, PacketId};

use crate::broadcast::{self, BroadcastResult};
use crate::dedup::{DuplicateFilter, FilterHandle};
use crate::peer::{Peer, PeerEvent, PeerInfo, PeerKey};
use crate::transport::{Listener, Network, StreamTransport, Transport, TransportEvent};
use crate::{NetworkError, PoolConfig};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Capacity of the request queue behind a [`PoolHandle`].
const REQUEST_QUEUE: usize = 256;

/// Observable pool activity.
#[derive(Debug)]
pub enum PoolEvent {
    /// The listening socket is bound.
    Listening(SocketAddr),
    /// A neighbour completed its handshake.
    Peer(PeerInfo),
    /// A payload seen for the first time.
    Data {
        peer: PeerKey,
        from: NodeId,
        id: PacketId,
        data: Vec<u8>,
    },
    /// A neighbour shared its peer list.
    PeerList { peer: PeerKey, peers: Vec<PeerRecord> },
    /// A connected peer went away.
    PeerClosed { key: PeerKey, node_id: Option<NodeId> },
    Error {
        peer: Option<PeerKey>,
        error: NetworkError,
    },
}

/// Requests accepted by a running pool.
#[derive(Debug)]
pub enum PoolRequest {
    Send {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<PacketId, NetworkError>>,
    },
    Connect {
        port: u16,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerInfo>>,
    },
    Shutdown,
}

enum Command<S> {
    Transport(PeerKey, TransportEvent),
    Accepted(S, SocketAddr),
    AcceptFailed(String),
    Dialed { key: PeerKey, result: io::Result<S> },
    Dial { port: u16, attempt: u32 },
}

/// An outbound dial still counting against its retry budget.
#[derive(Clone, Copy, Debug)]
struct Dial {
    port: u16,
    attempt: u32,
}

pub struct PeerPool<N: Network> {
    node_id: NodeId,
    config: PoolConfig,
    network: Arc<N>,
    port: Option<u16>,
    peers: BTreeMap<PeerKey, Peer>,
    filter: FilterHandle,
    dials: HashMap<PeerKey, Dial>,
    next_key: u64,
    commands: mpsc::UnboundedSender<Command<N::Stream>>,
    command_rx: mpsc::UnboundedReceiver<Command<N::Stream>>,
    events: mpsc::UnboundedSender<PoolEvent>,
    accept_task: Option<JoinHandle<()>>,
    next_ping: Option<Instant>,
}

impl<N: Network> PeerPool<N> {
    pub fn new(node_id: NodeId, config: PoolConfig, network: N) -> (Self, mpsc::UnboundedReceiver<PoolEvent>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let filter = FilterHandle::new(DuplicateFilter::new(config.dedup_capacity));
        let pool = Self {
            node_id,
            config,
            network: Arc::new(network),
            port: None,
            peers: BTreeMap::new(),
            filter,
            dials: HashMap::new(),
            next_key: 0,
            commands,
            command_rx,
            events,
            accept_task: None,
            next_ping: None,
        };
        (pool, event_rx)
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Bound listening port, once [`listen`](Self::listen) succeeded.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn filter(&self) -> &FilterHandle {
        &self.filter
    }

    /// Peers tracked right now, in any state.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Handshaked neighbours.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.values().filter_map(Peer::info).collect()
    }

    /// Bind the listening socket, start accepting and dial the seeds.
    pub async fn listen(&mut self, port: Option<u16>) -> Result<SocketAddr, NetworkError> {
        let requested = port.unwrap_or(0);
        let mut listener = self
            .network
            .bind(&self.config.host, requested)
            .await
            .map_err(|e| NetworkError::Io(format!("bind {}:{requested}: {e}", self.config.host)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| NetworkError::Io(e.to_string()))?;
        self.port = Some(addr.port());

        tracing::info!(%addr, node = %self.node_id, "listening");
        self.emit(PoolEvent::Listening(addr));

        let commands = self.commands.clone();
        self.accept_task = Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        if commands.send(Command::Accepted(stream, remote)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if commands.send(Command::AcceptFailed(e.to_string())).is_err() {
                            break;
                        }
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }));

        for seed in self.config.seeds.clone() {
            self.dial(seed, 1);
        }
        Ok(addr)
    }

    /// Dial `port`, retrying like a seed.
    pub fn connect(&mut self, port: u16) {
        self.dial(port, 1);
    }

    /// Wrap `data` in a fresh Data packet and flood it.
    pub fn send(&mut self, data: Vec<u8>) -> Result<PacketId, NetworkError> {
        let packet = Packet::data(data);
        let result = self.broadcast(&packet, None)?;
        tracing::debug!(
            packet_id = %packet.id,
            sent = result.sent,
            failed = result.failed,
            "data sent"
        );
        self.flush_events();
        Ok(packet.id)
    }

    /// Record the packet id, then write its frame to every neighbour other
    /// than `except`.
    pub fn broadcast(&mut self, packet: &Packet, except: Option<PeerKey>) -> Result<BroadcastResult, NetworkError> {
        let frame = packet.encode()?;
        self.filter.insert(packet.id);
        Ok(broadcast::flood(&mut self.peers, &frame, except))
    }

    /// Fire expired peer deadlines and send due keepalives.
    pub fn poll_timers(&mut self, now: Instant) {
        for peer in self.peers.values_mut() {
            peer.poll_timers(now);
        }
        if self.next_ping.is_some_and(|at| at <= now) {
            self.ping_all();
            self.next_ping = self.config.ping_interval.map(|interval| now + interval);
        }
        self.flush_events();
    }

    /// Earliest instant at which [`poll_timers`](Self::poll_timers) has
    /// work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.peers
            .values()
            .filter_map(Peer::next_deadline)
            .chain(self.next_ping)
            .min()
    }

    /// Run the event loop until a shutdown request arrives or every
    /// [`PoolHandle`] is dropped.
    pub async fn run(mut self, mut requests: mpsc::Receiver<PoolRequest>) {
        self.next_ping = self
            .config
            .ping_interval
            .map(|interval| Instant::now() + interval);

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                Some(command) = self.command_rx.recv() => self.handle_command(command),
                request = requests.recv() => match request {
                    Some(PoolRequest::Shutdown) | None => break,
                    Some(request) => self.handle_request(request),
                },
                () = sleep_until(deadline) => self.poll_timers(Instant::now()),
            }
        }

        self.shutdown();
    }

    /// Move the pool onto its own task.
    pub fn spawn(self) -> PoolHandle {
        let (requests, rx) = mpsc::channel(REQUEST_QUEUE);
        let task = tokio::spawn(self.run(rx));
        PoolHandle { requests, task }
    }

    /// Stop accepting and destroy every peer.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        for peer in self.peers.values_mut() {
            peer.destroy();
        }
        self.flush_events();
        self.dials.clear();
        tracing::info!(node = %self.node_id, "pool stopped");
    }

    fn handle_request(&mut self, request: PoolRequest) {
        match request {
            PoolRequest::Send { data, reply } => {
                let _ = reply.send(self.send(data));
            }
            PoolRequest::Connect { port } => self.connect(port),
            PoolRequest::Peers { reply } => {
                let _ = reply.send(self.peers());
            }
            PoolRequest::Shutdown => {}
        }
    }

    fn handle_command(&mut self, command: Command<N::Stream>) {
        let now = Instant::now();
        match command {
            Command::Transport(key, event) => {
                if let Some(peer) = self.peers.get_mut(&key) {
                    peer.on_transport(event, now);
                }
            }
            Command::Accepted(stream, remote) => self.accept(stream, remote, now),
            Command::AcceptFailed(e) => {
                tracing::warn!(error = %e, "accept failed");
                self.emit(PoolEvent::Error {
                    peer: None,
                    error: NetworkError::Io(e),
                });
            }
            Command::Dialed { key, result } => self.on_dialed(key, result, now),
            Command::Dial { port, attempt } => self.dial(port, attempt),
        }
        self.flush_events();
    }

    fn accept(&mut self, stream: N::Stream, remote: SocketAddr, now: Instant) {
        let inbound = self.peers.values().filter(|p| !p.is_outbound()).count();
        if inbound >= self.config.max_inbound {
            tracing::warn!(%remote, limit = self.config.max_inbound, "inbound limit reached, dropping connection");
            return;
        }

        let key = self.allocate_key();
        let transport = self.spawn_transport(key, stream);
        let peer = Peer::inbound(key, transport, self.filter.clone(), self.config.timeouts, now);
        tracing::debug!(peer = %key, %remote, "accepted connection");
        self.peers.insert(key, peer);
    }

    fn dial(&mut self, port: u16, attempt: u32) {
        let outbound = self.peers.values().filter(|p| p.is_outbound()).count();
        if outbound >= self.config.max_outbound {
            tracing::warn!(port, limit = self.config.max_outbound, "outbound limit reached, not dialing");
            return;
        }

        let key = self.allocate_key();
        let mut peer = Peer::outbound(key, port, self.filter.clone(), self.config.timeouts);
        peer.begin_connect(Instant::now());
        self.peers.insert(key, peer);
        self.dials.insert(key, Dial { port, attempt });
        tracing::debug!(peer = %key, port, attempt, "dialing");

        let network = Arc::clone(&self.network);
        let host = self.config.host.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = network.connect(&host, port).await;
            let _ = commands.send(Command::Dialed { key, result });
        });
    }

    fn on_dialed(&mut self, key: PeerKey, result: io::Result<N::Stream>, now: Instant) {
        if !self.peers.contains_key(&key) {
            tracing::debug!(peer = %key, "late dial result discarded");
            return;
        }
        match result {
            Ok(stream) => {
                let transport = self.spawn_transport(key, stream);
                if let Some(peer) = self.peers.get_mut(&key) {
                    peer.connected(transport, now);
                }
            }
            Err(e) => {
                if let Some(peer) = self.peers.get_mut(&key) {
                    let error = NetworkError::ConnectionFailed(format!("port {}: {e}", peer.port()));
                    peer.connect_failed(error);
                }
            }
        }
    }

    fn spawn_transport(&self, key: PeerKey, stream: N::Stream) -> Box<dyn Transport> {
        let commands = self.commands.clone();
        Box::new(StreamTransport::spawn(stream, move |event| {
            commands.send(Command::Transport(key, event)).is_ok()
        }))
    }

    fn allocate_key(&mut self) -> PeerKey {
        self.next_key += 1;
        PeerKey(self.next_key)
    }

    /// Dispatch queued peer events until every queue is empty.
    fn flush_events(&mut self) {
        while let Some(key) = self
            .peers
            .iter()
            .find(|(_, peer)| peer.has_events())
            .map(|(key, _)| *key)
        {
            while let Some(event) = self.peers.get_mut(&key).and_then(Peer::next_event) {
                self.dispatch(key, event);
            }
        }
    }

    fn dispatch(&mut self, key: PeerKey, event: PeerEvent) {
        match event {
            PeerEvent::Connect => {
                self.dials.remove(&key);
                tracing::debug!(peer = %key, "connected");
                self.send_handshake(key);
            }
            PeerEvent::Handshake { outbound } => self.on_handshake(key, outbound),
            PeerEvent::Packet(packet) => self.on_packet(key, packet),
            PeerEvent::Error(error) => {
                if let Some(dial) = self.dials.get(&key) {
                    tracing::warn!(port = dial.port, attempt = dial.attempt, %error, "dial failed");
                    return;
                }
                tracing::warn!(peer = %key, %error, "peer error");
                self.emit(PoolEvent::Error {
                    peer: Some(key),
                    error,
                });
            }
            PeerEvent::Close { was_connected } => self.on_close(key, was_connected),
        }
    }

    fn send_handshake(&mut self, key: PeerKey) {
        let record = PeerRecord::new(
            self.port.unwrap_or(0),
            self.config.host.clone(),
            self.node_id.clone(),
        );
        if let Some(peer) = self.peers.get_mut(&key) {
            if let Err(e) = peer.handshake(record, Instant::now()) {
                tracing::debug!(peer = %key, error = %e, "handshake not sent");
            }
        }
    }

    fn on_handshake(&mut self, key: PeerKey, outbound: bool) {
        let Some(peer) = self.peers.get(&key) else {
            return;
        };
        let Some(info) = peer.info() else {
            return;
        };
        let reply = !outbound && !peer.handshake_sent();

        tracing::info!(
            peer = %key,
            node = %info.node_id,
            port = info.port,
            outbound,
            "peer handshaked"
        );
        self.emit(PoolEvent::Peer(info));

        if reply {
            self.send_handshake(key);
        }
    }

    fn on_packet(&mut self, key: PeerKey, packet: Packet) {
        tracing::debug!(peer = %key, packet_id = %packet.id, kind = %packet.kind(), "packet");
        match packet.body {
            Body::Handshake(_) | Body::Pong => {}
            Body::Data(_) => self.on_data(key, packet),
            Body::Ping => self.reply(key, Packet::pong()),
            Body::GetPeers { count } => {
                let records = self.neighbour_records(key, count as usize);
                self.reply(key, Packet::send_peers(records));
            }
            Body::SendPeers(peers) => self.emit(PoolEvent::PeerList { peer: key, peers }),
        }
    }

    fn on_data(&mut self, key: PeerKey, packet: Packet) {
        let Some(from) = self.peers.get(&key).and_then(Peer::info) else {
            return;
        };
        match self.broadcast(&packet, Some(key)) {
            Ok(result) => tracing::debug!(
                packet_id = %packet.id,
                sent = result.sent,
                failed = result.failed,
                "relayed"
            ),
            Err(e) => tracing::warn!(packet_id = %packet.id, error = %e, "relay failed"),
        }
        if let Body::Data(data) = packet.body {
            self.emit(PoolEvent::Data {
                peer: key,
                from: from.node_id,
                id: packet.id,
                data,
            });
        }
    }

    fn reply(&mut self, key: PeerKey, packet: Packet) {
        if let Some(peer) = self.peers.get_mut(&key) {
            if let Err(e) = peer.send(&packet) {
                tracing::debug!(peer = %key, kind = %packet.kind(), error = %e, "reply not sent");
            }
        }
    }

    fn neighbour_records(&self, except: PeerKey, count: usize) -> Vec<PeerRecord> {
        self.peers
            .iter()
            .filter(|(key, _)| **key != except)
            .filter_map(|(_, peer)| peer.remote().cloned())
            .take(count)
            .collect()
    }

    fn ping_all(&mut self) {
        for peer in self.peers.values_mut().filter(|p| p.is_handshaked()) {
            // One packet per peer: ids are unique per origination.
            if let Err(e) = peer.send(&Packet::ping()) {
                tracing::debug!(peer = %peer.key(), error = %e, "ping not sent");
            }
        }
    }

    fn on_close(&mut self, key: PeerKey, was_connected: bool) {
        let node_id = self
            .peers
            .remove(&key)
            .and_then(|peer| peer.remote().map(|r| r.peer_id.clone()));
        if let Some(dial) = self.dials.remove(&key) {
            self.retry(dial);
        }
        tracing::debug!(peer = %key, was_connected, remaining = self.peers.len(), "peer removed");
        if was_connected {
            self.emit(PoolEvent::PeerClosed { key, node_id });
        }
    }

    fn retry(&mut self, dial: Dial) {
        if dial.attempt >= self.config.seed_retry_attempts {
            tracing::warn!(port = dial.port, attempts = dial.attempt, "giving up on peer");
            return;
        }
        let delay = self.config.seed_retry_delay;
        tracing::debug!(port = dial.port, attempt = dial.attempt, ?delay, "retrying dial");

        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::Dial {
                port: dial.port,
                attempt: dial.attempt + 1,
            });
        });
    }

    fn emit(&self, event: PoolEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Control surface of a spawned pool.
pub struct PoolHandle {
    requests: mpsc::Sender<PoolRequest>,
    task: JoinHandle<()>,
}

impl PoolHandle {
    /// Originate a Data packet.
    pub async fn send(&self, data: impl Into<Vec<u8>>) -> Result<PacketId, NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.request(PoolRequest::Send {
            data: data.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| NetworkError::PoolClosed)?
    }

    /// Dial an extra peer.
    pub async fn connect(&self, port: u16) -> Result<(), NetworkError> {
        self.request(PoolRequest::Connect { port }).await
    }

    /// Handshaked neighbours.
    pub async fn peers(&self) -> Result<Vec<PeerInfo>, NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.request(PoolRequest::Peers { reply }).await?;
        rx.await.map_err(|_| NetworkError::PoolClosed)
    }

    /// Stop the pool and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.requests.send(PoolRequest::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "pool task ended abnormally");
        }
    }

    async fn request(&self, request: PoolRequest) -> Result<(), NetworkError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| NetworkError::PoolClosed)
    }
}
