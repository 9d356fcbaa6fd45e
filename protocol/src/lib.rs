//! Wire protocol — packet framing, encoding/decoding and the incremental
//! stream parser.
//!
//! Every frame is a fixed 21-byte header followed by a type-specific payload:
//!
//! ```text
//! byte 0       : packet type
//! bytes 1-4    : payload size (u32, big-endian)
//! bytes 5-12   : timestamp (f64, epoch ms, big-endian)
//! bytes 13-20  : packet id
//! bytes 21..   : payload (exactly `payload size` bytes)
//! ```

pub mod codec;
pub mod error;
pub mod handshake;
pub mod packet;
pub mod parser;

pub use codec::{decode, decode_header, encode, HEADER_LEN, MAX_PAYLOAD_SIZE};
pub use error::ProtocolError;
pub use handshake::PeerRecord;
pub use packet::{Body, Header, Packet, PacketType};
pub use parser::BufferParser;
