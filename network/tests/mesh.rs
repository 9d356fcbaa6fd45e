//! Multi-node behaviour over the in-memory network.
//!
//! Every test runs on a paused clock, so handshake and retry deadlines
//! elapse as soon as the runtime is idle.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

use murmur_network::{PeerPool, PoolConfig, PoolEvent, PoolHandle};
use murmur_nullables::NullNetwork;
use murmur_protocol::{Body, BufferParser, Packet, PacketType, PeerRecord};
use murmur_types::{NodeId, PacketId};

struct TestNode {
    id: NodeId,
    port: u16,
    handle: PoolHandle,
    events: UnboundedReceiver<PoolEvent>,
}

async fn start(net: &NullNetwork, port: Option<u16>, seeds: Vec<u16>) -> TestNode {
    let config = PoolConfig {
        seeds,
        ..PoolConfig::default()
    };
    start_with(net, port, config).await
}

async fn start_with(net: &NullNetwork, port: Option<u16>, config: PoolConfig) -> TestNode {
    let id = NodeId::random();
    let (mut pool, mut events) = PeerPool::new(id.clone(), config, net.clone());
    let addr = pool.listen(port).await.unwrap();
    assert!(matches!(events.recv().await, Some(PoolEvent::Listening(a)) if a == addr));
    TestNode {
        id,
        port: addr.port(),
        handle: pool.spawn(),
        events,
    }
}

impl TestNode {
    async fn next_event(&mut self) -> PoolEvent {
        timeout(Duration::from_secs(30), self.events.recv())
            .await
            .expect("timed out waiting for pool event")
            .expect("pool event channel closed")
    }

    /// Wait for `n` handshakes and return the remote ids.
    async fn wait_peers(&mut self, n: usize) -> Vec<NodeId> {
        let mut ids = Vec::new();
        while ids.len() < n {
            match self.next_event().await {
                PoolEvent::Peer(info) => ids.push(info.node_id),
                PoolEvent::Data { .. } => panic!("data before all peers handshaked"),
                _ => {}
            }
        }
        ids
    }

    async fn next_data(&mut self) -> (PacketId, Vec<u8>) {
        loop {
            if let PoolEvent::Data { id, data, .. } = self.next_event().await {
                return (id, data);
            }
        }
    }

    fn assert_no_data(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            assert!(
                !matches!(event, PoolEvent::Data { .. }),
                "unexpected extra data: {event:?}"
            );
        }
    }
}

fn handshake_frame(port: u16, id: &NodeId) -> Vec<u8> {
    Packet::handshake(PeerRecord::new(port, "127.0.0.1", id.clone()))
        .encode()
        .unwrap()
}

async fn read_packet(stream: &mut DuplexStream, parser: &mut BufferParser, pending: &mut Vec<Packet>) -> Packet {
    let mut buf = [0u8; 4096];
    while pending.is_empty() {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "stream closed");
        parser.feed(&buf[..n], pending).unwrap();
    }
    pending.remove(0)
}

#[tokio::test(start_paused = true)]
async fn three_node_mesh_delivers_each_packet_once() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();

    let mut a = start(&net, None, Vec::new()).await;
    let mut b = start(&net, None, vec![a.port]).await;
    let mut c = start(&net, None, vec![a.port, b.port]).await;

    let a_peers = a.wait_peers(2).await;
    let b_peers = b.wait_peers(2).await;
    let c_peers = c.wait_peers(2).await;
    assert!(a_peers.contains(&b.id) && a_peers.contains(&c.id));
    assert!(b_peers.contains(&a.id) && b_peers.contains(&c.id));
    assert!(c_peers.contains(&a.id) && c_peers.contains(&b.id));

    let sent = a.handle.send(b"hello mesh".to_vec()).await.unwrap();

    assert_eq!(b.next_data().await, (sent, b"hello mesh".to_vec()));
    assert_eq!(c.next_data().await, (sent, b"hello mesh".to_vec()));

    // Let every relay and echo settle.
    sleep(Duration::from_secs(5)).await;
    a.assert_no_data();
    b.assert_no_data();
    c.assert_no_data();

    for node in [a, b, c] {
        node.handle.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn identical_frame_is_delivered_and_relayed_once() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();

    let mut a = start(&net, None, Vec::new()).await;
    let mut b = start(&net, None, vec![a.port]).await;
    a.wait_peers(1).await;
    b.wait_peers(1).await;

    let mut raw = net.connect_raw(a.port).unwrap();
    let raw_id = NodeId::random();
    raw.write_all(&handshake_frame(1234, &raw_id)).await.unwrap();
    assert_eq!(a.wait_peers(1).await, vec![raw_id]);

    let mut observer = net.connect_raw(a.port).unwrap();
    observer
        .write_all(&handshake_frame(1235, &NodeId::random()))
        .await
        .unwrap();
    a.wait_peers(1).await;

    let frame = Packet::data(b"twice".to_vec()).encode().unwrap();
    raw.write_all(&frame).await.unwrap();
    raw.write_all(&frame).await.unwrap();

    assert_eq!(a.next_data().await.1, b"twice");
    assert_eq!(b.next_data().await.1, b"twice");

    // The observer sees A's handshake reply, then a single relayed copy.
    let mut parser = BufferParser::new();
    let mut pending = Vec::new();
    let hello = read_packet(&mut observer, &mut parser, &mut pending).await;
    assert!(matches!(hello.body, Body::Handshake(_)));
    let relayed = read_packet(&mut observer, &mut parser, &mut pending).await;
    assert_eq!(relayed.body, Body::Data(b"twice".to_vec()));
    assert!(
        timeout(
            Duration::from_secs(5),
            read_packet(&mut observer, &mut parser, &mut pending)
        )
        .await
        .is_err(),
        "frame relayed more than once"
    );

    a.assert_no_data();
    b.assert_no_data();
}

#[tokio::test(start_paused = true)]
async fn data_before_handshake_is_not_delivered() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let mut a = start(&net, None, Vec::new()).await;

    let mut raw = net.connect_raw(a.port).unwrap();
    raw.write_all(&Packet::data(b"early".to_vec()).encode().unwrap())
        .await
        .unwrap();
    raw.write_all(&handshake_frame(1234, &NodeId::random()))
        .await
        .unwrap();
    raw.write_all(&Packet::data(b"late".to_vec()).encode().unwrap())
        .await
        .unwrap();

    a.wait_peers(1).await;
    assert_eq!(a.next_data().await.1, b"late");

    sleep(Duration::from_secs(1)).await;
    a.assert_no_data();
}

#[tokio::test(start_paused = true)]
async fn silent_inbound_peer_is_removed_after_handshake_timeout() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let mut a = start(&net, None, Vec::new()).await;

    let mut raw = net.connect_raw(a.port).unwrap();
    let started = tokio::time::Instant::now();

    loop {
        match a.next_event().await {
            PoolEvent::PeerClosed { node_id, .. } => {
                assert!(node_id.is_none());
                break;
            }
            PoolEvent::Peer(_) => panic!("silent peer must not handshake"),
            _ => {}
        }
    }
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(a.handle.peers().await.unwrap().is_empty());

    let mut buf = [0u8; 16];
    assert_eq!(raw.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn seed_dial_is_retried_until_it_listens() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let mut b = start(&net, None, vec![4999]).await;

    while net.dial_count(4999) == 0 {
        sleep(Duration::from_millis(10)).await;
    }
    let mut a = start(&net, Some(4999), Vec::new()).await;

    assert_eq!(b.wait_peers(1).await, vec![a.id.clone()]);
    a.wait_peers(1).await;
    assert_eq!(net.dial_count(4999), 2);
}

#[tokio::test(start_paused = true)]
async fn unreachable_seed_is_abandoned_after_retry_budget() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let b = start(&net, None, vec![4999]).await;

    sleep(Duration::from_secs(30)).await;
    assert_eq!(net.dial_count(4999), 4);
    assert!(b.handle.peers().await.unwrap().is_empty());
    b.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn get_peers_lists_other_neighbours() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let mut a = start(&net, None, Vec::new()).await;
    let b = start(&net, None, vec![a.port]).await;
    let c = start(&net, None, vec![a.port]).await;
    a.wait_peers(2).await;

    let mut raw = net.connect_raw(a.port).unwrap();
    raw.write_all(&handshake_frame(1234, &NodeId::random()))
        .await
        .unwrap();
    raw.write_all(&Packet::get_peers(10).encode().unwrap())
        .await
        .unwrap();

    let mut parser = BufferParser::new();
    let mut pending = Vec::new();
    let hello = read_packet(&mut raw, &mut parser, &mut pending).await;
    assert!(matches!(hello.body, Body::Handshake(ref r) if r.peer_id == a.id));

    match read_packet(&mut raw, &mut parser, &mut pending).await.body {
        Body::SendPeers(records) => {
            let ids: Vec<NodeId> = records.into_iter().map(|r| r.peer_id).collect();
            assert_eq!(ids.len(), 2);
            assert!(ids.contains(&b.id) && ids.contains(&c.id));
        }
        other => panic!("expected peer list, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn received_peer_list_is_surfaced_not_dialed() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let mut a = start(&net, None, Vec::new()).await;

    let mut raw = net.connect_raw(a.port).unwrap();
    raw.write_all(&handshake_frame(1234, &NodeId::random()))
        .await
        .unwrap();
    let advertised = PeerRecord::new(7777, "127.0.0.1", NodeId::random());
    raw.write_all(&Packet::send_peers(vec![advertised.clone()]).encode().unwrap())
        .await
        .unwrap();

    loop {
        if let PoolEvent::PeerList { peers, .. } = a.next_event().await {
            assert_eq!(peers, vec![advertised]);
            break;
        }
    }
    sleep(Duration::from_secs(1)).await;
    assert_eq!(net.dial_count(7777), 0);
}

#[tokio::test(start_paused = true)]
async fn inbound_limit_drops_extra_connections() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let config = PoolConfig {
        max_inbound: 1,
        ..PoolConfig::default()
    };
    let mut a = start_with(&net, None, config).await;

    let mut first = net.connect_raw(a.port).unwrap();
    first
        .write_all(&handshake_frame(1234, &NodeId::random()))
        .await
        .unwrap();
    a.wait_peers(1).await;

    let mut second = net.connect_raw(a.port).unwrap();
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(1), second.read(&mut buf))
        .await
        .expect("extra connection left open")
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(a.handle.peers().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn outbound_limit_skips_extra_seeds() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let mut a = start(&net, None, Vec::new()).await;
    let c = start(&net, None, Vec::new()).await;

    let config = PoolConfig {
        seeds: vec![a.port, c.port],
        max_outbound: 1,
        ..PoolConfig::default()
    };
    let mut b = start_with(&net, None, config).await;

    assert_eq!(b.wait_peers(1).await, vec![a.id.clone()]);
    a.wait_peers(1).await;

    sleep(Duration::from_secs(5)).await;
    assert_eq!(net.dial_count(a.port), 1);
    assert_eq!(net.dial_count(c.port), 0);
    assert_eq!(b.handle.peers().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn keepalive_pings_until_idle_timeout() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();
    let a = start(&net, None, Vec::new()).await;

    let started = tokio::time::Instant::now();
    let mut raw = net.connect_raw(a.port).unwrap();
    raw.write_all(&handshake_frame(1234, &NodeId::random()))
        .await
        .unwrap();

    // Never answer: the pool keeps pinging until the liveness deadline.
    let mut parser = BufferParser::new();
    let mut seen = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = raw.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        let mut out = Vec::new();
        parser.feed(&buf[..n], &mut out).unwrap();
        for packet in out {
            seen.push((started.elapsed().as_secs(), packet.kind()));
        }
    }
    let closed_at = started.elapsed();

    assert_eq!(
        seen,
        vec![
            (0, PacketType::Handshake),
            (15, PacketType::Ping),
            (30, PacketType::Ping),
            (45, PacketType::Ping),
        ]
    );
    assert!(closed_at >= Duration::from_secs(60));
    assert!(a.handle.peers().await.unwrap().is_empty());
}
