//! Two nodes over real TCP on loopback.

use std::time::Duration;

use tokio::time::timeout;

use murmur_network::PeerKey;
use murmur_node::{Node, NodeConfig, NodeHandle, PoolEvent};
use murmur_nullables::NullNetwork;
use murmur_types::NodeId;

const WAIT: Duration = Duration::from_secs(10);

async fn next_event(handle: &mut NodeHandle) -> PoolEvent {
    timeout(WAIT, handle.next_event())
        .await
        .expect("timed out waiting for node event")
        .expect("node stopped")
}

async fn wait_peer(handle: &mut NodeHandle) -> NodeId {
    loop {
        if let PoolEvent::Peer(info) = next_event(handle).await {
            return info.node_id;
        }
    }
}

async fn wait_data(handle: &mut NodeHandle) -> (PeerKey, NodeId, Vec<u8>) {
    loop {
        if let PoolEvent::Data { peer, from, data, .. } = next_event(handle).await {
            return (peer, from, data);
        }
    }
}

#[tokio::test]
async fn seeded_node_handshakes_and_receives_data() {
    murmur_utils::init_test_tracing();

    let mut a = Node::new(NodeConfig::default()).start().await.unwrap();
    let b_config = NodeConfig {
        seeds: vec![a.port()],
        ..NodeConfig::default()
    };
    let mut b = Node::new(b_config).start().await.unwrap();

    assert_eq!(&wait_peer(&mut a).await, b.id());
    assert_eq!(&wait_peer(&mut b).await, a.id());

    a.send("test").await.unwrap();
    let (_, from, data) = wait_data(&mut b).await;
    assert_eq!(&from, a.id());
    assert_eq!(data, b"test");

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn connect_on_demand_and_reply() {
    murmur_utils::init_test_tracing();

    let mut a = Node::new(NodeConfig::default()).start().await.unwrap();
    let mut b = Node::new(NodeConfig::default()).start().await.unwrap();
    b.connect(a.port()).await.unwrap();

    wait_peer(&mut a).await;
    wait_peer(&mut b).await;

    b.send(b"hi a".to_vec()).await.unwrap();
    assert_eq!(wait_data(&mut a).await.2, b"hi a");

    a.send(b"hi b".to_vec()).await.unwrap();
    assert_eq!(wait_data(&mut b).await.2, b"hi b");

    let peers = b.peers().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(&peers[0].node_id, a.id());
    assert_eq!(peers[0].port, u32::from(a.port()));
    assert!(peers[0].outbound);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn peer_closed_after_remote_shutdown() {
    murmur_utils::init_test_tracing();
    let net = NullNetwork::new();

    let mut a = Node::with_network(NodeConfig::default(), net.clone())
        .start()
        .await
        .unwrap();
    let b_config = NodeConfig {
        seeds: vec![a.port()],
        ..NodeConfig::default()
    };
    let mut b = Node::with_network(b_config, net).start().await.unwrap();
    wait_peer(&mut a).await;
    wait_peer(&mut b).await;

    let b_id = b.id().clone();
    b.shutdown().await;

    loop {
        if let PoolEvent::PeerClosed { node_id, .. } = next_event(&mut a).await {
            assert_eq!(node_id, Some(b_id));
            break;
        }
    }
    assert!(a.peers().await.unwrap().is_empty());
    a.shutdown().await;
}
