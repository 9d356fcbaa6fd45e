//! Frame codec — header layout, payload size derivation, and the
//! big-endian primitives shared by every payload type.

use murmur_types::{PacketId, Timestamp, PACKET_ID_LEN};

use crate::packet::{Body, Header, Packet, PacketType};
use crate::ProtocolError;

const TYPE_LEN: usize = 1;
const SIZE_LEN: usize = 4;
const TIMESTAMP_LEN: usize = 8;

const SIZE_OFFSET: usize = TYPE_LEN;
const TIMESTAMP_OFFSET: usize = SIZE_OFFSET + SIZE_LEN;
const ID_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_LEN;

/// Length of the fixed frame header.
pub const HEADER_LEN: usize = TYPE_LEN + SIZE_LEN + TIMESTAMP_LEN + PACKET_ID_LEN;

/// Maximum payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Encode a packet into one complete frame.
///
/// The payload is serialized first and the size field is written from its
/// actual length, so the header can never disagree with the bytes behind it.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Writer::default();
    packet.body.encode_payload(&mut payload);
    let payload = payload.into_inner();

    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(packet.kind() as u8);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&packet.timestamp.to_be_bytes());
    frame.extend_from_slice(packet.id.as_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode the fixed header at the start of `buf`.
///
/// Returns `Ok(None)` while fewer than [`HEADER_LEN`] bytes are available.
pub fn decode_header(buf: &[u8]) -> Result<Option<Header>, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let kind = PacketType::try_from(buf[0])?;
    let size = u32::from_be_bytes(
        buf[SIZE_OFFSET..TIMESTAMP_OFFSET]
            .try_into()
            .map_err(|_| ProtocolError::Truncated("size"))?,
    );
    if size as usize > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: size as usize,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let timestamp = Timestamp::from_be_bytes(
        buf[TIMESTAMP_OFFSET..ID_OFFSET]
            .try_into()
            .map_err(|_| ProtocolError::Truncated("timestamp"))?,
    );
    let id = PacketId::from_slice(&buf[ID_OFFSET..HEADER_LEN])
        .map_err(|_| ProtocolError::Truncated("packet id"))?;

    Ok(Some(Header {
        kind,
        size,
        timestamp,
        id,
    }))
}

/// Decode one frame from the start of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold the whole frame; a
/// declared size larger than what is buffered means "incomplete", never
/// "malformed". On success also returns the number of bytes consumed.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet, usize)>, ProtocolError> {
    let Some(header) = decode_header(buf)? else {
        return Ok(None);
    };

    let total = HEADER_LEN + header.size as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let body = Body::decode_payload(header.kind, &buf[HEADER_LEN..total])?;
    let packet = Packet {
        id: header.id,
        timestamp: header.timestamp,
        body,
    };
    Ok(Some((packet, total)))
}

/// Big-endian payload writer.
#[derive(Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a u32 length prefix followed by the bytes.
    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Big-endian payload reader over exactly one payload.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32, ProtocolError> {
        let end = self.pos + 4;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(ProtocolError::Truncated(what))?;
        self.pos = end;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn bytes(&mut self, what: &'static str) -> Result<&'a [u8], ProtocolError> {
        let len = self.u32(what)? as usize;
        let end = self
            .pos
            .checked_add(len)
            .ok_or(ProtocolError::Truncated(what))?;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(ProtocolError::Truncated(what))?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn str(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        let bytes = self.bytes(what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(what))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Require the payload to have been consumed exactly.
    pub(crate) fn finish(self) -> Result<(), ProtocolError> {
        if self.pos != self.buf.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: self.buf.len(),
                actual: self.pos,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeerRecord;
    use murmur_types::NodeId;

    fn fixed(body: Body) -> Packet {
        Packet {
            id: PacketId::new([1, 2, 3, 4, 5, 6, 7, 8]),
            timestamp: Timestamp::from_millis(1_700_000_000_000.0),
            body,
        }
    }

    #[test]
    fn header_layout_is_big_endian() {
        let packet = fixed(Body::Data(b"abc".to_vec()));
        let frame = encode(&packet).unwrap();

        assert_eq!(HEADER_LEN, 21);
        assert_eq!(frame[0], 0x81);
        // dataLen:u32 + 3 bytes
        assert_eq!(&frame[1..5], &7u32.to_be_bytes());
        assert_eq!(&frame[5..13], &1_700_000_000_000f64.to_be_bytes());
        assert_eq!(&frame[13..21], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&frame[21..25], &3u32.to_be_bytes());
        assert_eq!(&frame[25..], b"abc");
    }

    #[test]
    fn size_field_matches_payload_for_non_ascii_host() {
        let packet = fixed(Body::Handshake(PeerRecord {
            port: 4000,
            host: "hôte-ü".into(),
            peer_id: NodeId::from_hex("abcd").unwrap(),
        }));
        let frame = encode(&packet).unwrap();
        let header = decode_header(&frame).unwrap().unwrap();
        assert_eq!(header.size as usize, frame.len() - HEADER_LEN);
    }

    #[test]
    fn decode_returns_consumed_length() {
        let packet = fixed(Body::Ping);
        let mut frame = encode(&packet).unwrap();
        let len = frame.len();
        frame.extend_from_slice(b"trailing");

        let (decoded, consumed) = decode(&frame).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(consumed, len);
    }

    #[test]
    fn short_buffer_is_incomplete() {
        let frame = encode(&fixed(Body::Data(vec![9; 32]))).unwrap();
        assert!(decode_header(&frame[..HEADER_LEN - 1]).unwrap().is_none());
        assert!(decode(&frame[..frame.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut frame = encode(&fixed(Body::Ping)).unwrap();
        frame[0] = 0x42;
        assert_eq!(decode(&frame), Err(ProtocolError::UnknownType(0x42)));
    }

    #[test]
    fn oversized_declaration_is_rejected() {
        let mut frame = encode(&fixed(Body::Ping)).unwrap();
        frame[1..5].copy_from_slice(&(MAX_PAYLOAD_SIZE as u32 + 1).to_be_bytes());
        assert!(matches!(
            decode_header(&frame),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn payload_trailing_bytes_are_size_mismatch() {
        let mut frame = encode(&fixed(Body::Data(b"xy".to_vec()))).unwrap();
        // Declare one byte more than the data blob accounts for.
        frame.push(0);
        let declared = (frame.len() - HEADER_LEN) as u32;
        frame[1..5].copy_from_slice(&declared.to_be_bytes());

        assert_eq!(
            decode(&frame),
            Err(ProtocolError::SizeMismatch {
                declared: 7,
                actual: 6
            })
        );
    }

    #[test]
    fn inner_length_past_payload_is_truncated() {
        let mut frame = encode(&fixed(Body::Data(b"xy".to_vec()))).unwrap();
        frame[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&100u32.to_be_bytes());
        assert_eq!(decode(&frame), Err(ProtocolError::Truncated("data")));
    }
}
