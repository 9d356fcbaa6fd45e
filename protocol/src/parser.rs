//! Incremental stream-to-packet decoder.
//!
//! A connection delivers bytes in arbitrary chunks: a chunk may hold half a
//! header, several frames, or the tail of one frame and the head of the next.
//! [`BufferParser`] keeps the unconsumed residue between calls and emits
//! every complete frame in order.
//!
//! The wire format has no resynchronization marker. Once a frame is found to
//! be invalid the parser cannot know where the next frame starts, so the
//! whole residue is discarded and the error is reported to the owner, which
//! is expected to drop the connection.
//!
//! `feed` takes `&mut self`: overlapping feeds on one parser cannot be
//! expressed, so no runtime reentrancy guard is needed.

use crate::codec::{self, HEADER_LEN};
use crate::packet::{Packet, PacketType};
use crate::ProtocolError;

/// Upper bound on frames decoded by a single `feed` call. Anything past it
/// stays buffered for the next call.
pub const MAX_FRAMES_PER_FEED: usize = 20_000;

pub struct BufferParser {
    residual: Vec<u8>,
    accepted: Vec<PacketType>,
    max_frames: usize,
}

impl BufferParser {
    /// A parser accepting every known packet type.
    pub fn new() -> Self {
        Self::with_accepted(&PacketType::ALL)
    }

    /// A parser accepting only `accepted`; any other type is fatal.
    pub fn with_accepted(accepted: &[PacketType]) -> Self {
        Self {
            residual: Vec::new(),
            accepted: accepted.to_vec(),
            max_frames: MAX_FRAMES_PER_FEED,
        }
    }

    /// Override the per-feed frame ceiling.
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames.max(1);
        self
    }

    /// Append `data` and push every complete frame onto `out`.
    ///
    /// Packets decoded before a failure are left in `out`, in stream order.
    /// On failure the residue is discarded.
    pub fn feed(&mut self, data: &[u8], out: &mut Vec<Packet>) -> Result<(), ProtocolError> {
        self.residual.extend_from_slice(data);

        let mut offset = 0;
        let mut frames = 0;
        let result = loop {
            let buf = &self.residual[offset..];
            if buf.len() < HEADER_LEN {
                break Ok(());
            }
            if frames >= self.max_frames {
                tracing::debug!(buffered = buf.len(), "frame ceiling reached, deferring");
                break Ok(());
            }

            let header = match codec::decode_header(buf) {
                Ok(Some(header)) => header,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            if !self.accepted.contains(&header.kind) {
                break Err(ProtocolError::UnknownType(header.kind as u8));
            }
            if HEADER_LEN + header.size as usize > buf.len() {
                break Ok(());
            }

            match codec::decode(buf) {
                Ok(Some((packet, consumed))) => {
                    offset += consumed;
                    frames += 1;
                    out.push(packet);
                }
                // The size check above guarantees the whole frame is present.
                Ok(None) => break Err(ProtocolError::Truncated("frame")),
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(()) => {
                self.residual.drain(..offset);
                if !self.residual.is_empty() {
                    tracing::trace!(left = self.residual.len(), "partial frame buffered");
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    discarded = self.residual.len() - offset,
                    "received invalid frame"
                );
                self.residual.clear();
                Err(e)
            }
        }
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.residual.len()
    }

    /// Encode a packet for the stream this parser reads.
    pub fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
        codec::encode(packet)
    }
}

impl Default for BufferParser {
    fn default() -> Self {
        Self::new()
    }
}
