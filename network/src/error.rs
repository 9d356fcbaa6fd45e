use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connect to port {port} timed out")]
    ConnectTimeout { port: u32 },

    #[error("peer did not handshake in time")]
    HandshakeTimeout,

    #[error("peer idle for too long")]
    IdleTimeout,

    #[error("outbound peer gave a different port: expected {expected} got {got}")]
    PortMismatch { expected: u32, got: u32 },

    #[error("destroyed peer sent a packet")]
    DestroyedPeer,

    #[error("peer is not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] murmur_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("pool task has stopped")]
    PoolClosed,
}
