//! Packet model — the tagged union of every packet kind and its payload.

use std::fmt;

use murmur_types::{PacketId, Timestamp};

use crate::codec::{self, Reader, Writer};
use crate::handshake::PeerRecord;
use crate::ProtocolError;

/// One-byte packet type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Data = 0x81,
    Handshake = 0x82,
    GetPeers = 0x83,
    SendPeers = 0x84,
    Ping = 0x85,
    Pong = 0x86,
}

impl PacketType {
    /// Every known packet type, in tag order.
    pub const ALL: [PacketType; 6] = [
        Self::Data,
        Self::Handshake,
        Self::GetPeers,
        Self::SendPeers,
        Self::Ping,
        Self::Pong,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Handshake => "HANDSHAKE",
            Self::GetPeers => "GETPEERS",
            Self::SendPeers => "SENDPEERS",
            Self::Ping => "PING",
            Self::Pong => "PONG",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x81 => Ok(Self::Data),
            0x82 => Ok(Self::Handshake),
            0x83 => Ok(Self::GetPeers),
            0x84 => Ok(Self::SendPeers),
            0x85 => Ok(Self::Ping),
            0x86 => Ok(Self::Pong),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded fixed header of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
    pub kind: PacketType,
    /// Declared payload size in bytes.
    pub size: u32,
    pub timestamp: Timestamp,
    pub id: PacketId,
}

/// Type-specific packet payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Opaque application data, flooded to every peer.
    Data(Vec<u8>),
    /// Identity exchange: advertised listening port, host and node id.
    Handshake(PeerRecord),
    /// Request for up to `count` known peers.
    GetPeers { count: u32 },
    /// Answer to [`Body::GetPeers`].
    SendPeers(Vec<PeerRecord>),
    Ping,
    Pong,
}

impl Body {
    pub fn kind(&self) -> PacketType {
        match self {
            Self::Data(_) => PacketType::Data,
            Self::Handshake(_) => PacketType::Handshake,
            Self::GetPeers { .. } => PacketType::GetPeers,
            Self::SendPeers(_) => PacketType::SendPeers,
            Self::Ping => PacketType::Ping,
            Self::Pong => PacketType::Pong,
        }
    }

    pub(crate) fn encode_payload(&self, w: &mut Writer) {
        match self {
            Self::Data(data) => w.put_bytes(data),
            Self::Handshake(record) => record.encode_into(w),
            Self::GetPeers { count } => w.put_u32(*count),
            Self::SendPeers(records) => {
                w.put_u32(records.len() as u32);
                for record in records {
                    record.encode_into(w);
                }
            }
            Self::Ping | Self::Pong => {}
        }
    }

    /// Decoder table: one decoder per packet type, resolved statically.
    ///
    /// `payload` is exactly the declared payload; every decoder must consume
    /// all of it.
    pub(crate) fn decode_payload(kind: PacketType, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(payload);
        let body = match kind {
            PacketType::Data => Self::Data(r.bytes("data")?.to_vec()),
            PacketType::Handshake => Self::Handshake(PeerRecord::decode_from(&mut r)?),
            PacketType::GetPeers => Self::GetPeers {
                count: r.u32("peer count")?,
            },
            PacketType::SendPeers => Self::SendPeers(decode_peer_list(&mut r)?),
            PacketType::Ping => Self::Ping,
            PacketType::Pong => Self::Pong,
        };
        r.finish()?;
        Ok(body)
    }
}

fn decode_peer_list(r: &mut Reader<'_>) -> Result<Vec<PeerRecord>, ProtocolError> {
    let n = r.u32("peer list length")? as usize;
    // Every record is at least 12 bytes; a hostile count must not drive
    // preallocation past what the payload could hold.
    let mut records = Vec::with_capacity(n.min(r.remaining() / 12));
    for _ in 0..n {
        records.push(PeerRecord::decode_from(r)?);
    }
    Ok(records)
}

/// A single protocol packet: common metadata plus its body.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub id: PacketId,
    pub timestamp: Timestamp,
    pub body: Body,
}

impl Packet {
    /// Create a packet with a fresh random id and the current time.
    pub fn new(body: Body) -> Self {
        Self {
            id: PacketId::random(),
            timestamp: Timestamp::now(),
            body,
        }
    }

    pub fn data(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Body::Data(data.into()))
    }

    pub fn handshake(record: PeerRecord) -> Self {
        Self::new(Body::Handshake(record))
    }

    pub fn get_peers(count: u32) -> Self {
        Self::new(Body::GetPeers { count })
    }

    pub fn send_peers(records: Vec<PeerRecord>) -> Self {
        Self::new(Body::SendPeers(records))
    }

    pub fn ping() -> Self {
        Self::new(Body::Ping)
    }

    pub fn pong() -> Self {
        Self::new(Body::Pong)
    }

    pub fn kind(&self) -> PacketType {
        self.body.kind()
    }

    /// Serialized payload length, as written in the size field.
    pub fn payload_size(&self) -> usize {
        let mut w = Writer::default();
        self.body.encode_payload(&mut w);
        w.into_inner().len()
    }

    /// Full frame length (header plus payload).
    pub fn total_size(&self) -> usize {
        codec::HEADER_LEN + self.payload_size()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        codec::encode(self)
    }
}
