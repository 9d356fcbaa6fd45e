//! Packet and node identifiers.
//!
//! Both identifiers are drawn from the operating system's CSPRNG. Packet ids
//! are the sole key for duplicate suppression, so they must never be derived
//! from packet content or a counter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Width of a packet id on the wire.
pub const PACKET_ID_LEN: usize = 8;

/// Width of a freshly generated node id.
pub const NODE_ID_LEN: usize = 16;

/// A random per-packet token, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketId([u8; PACKET_ID_LEN]);

impl PacketId {
    pub fn new(bytes: [u8; PACKET_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh id from the OS random source.
    pub fn try_random() -> Result<Self, TypesError> {
        let mut bytes = [0u8; PACKET_ID_LEN];
        getrandom::getrandom(&mut bytes).map_err(|e| TypesError::Random(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Draw a fresh id from the OS random source.
    ///
    /// # Panics
    /// Panics if the operating system cannot provide randomness.
    pub fn random() -> Self {
        Self::try_random().expect("OS random source unavailable")
    }

    /// Build an id from a wire slice of exactly [`PACKET_ID_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        let arr: [u8; PACKET_ID_LEN] =
            bytes.try_into().map_err(|_| TypesError::InvalidLength {
                expected: PACKET_ID_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PacketId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketId({})", self.to_hex())
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Identity a node advertises in its handshake.
///
/// Carried on the wire as length-prefixed raw bytes and shown as hex, so any
/// length is accepted from remote peers. Locally generated ids are
/// [`NODE_ID_LEN`] bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Vec<u8>);

impl NodeId {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generate a random node id.
    ///
    /// # Panics
    /// Panics if the operating system cannot provide randomness.
    pub fn random() -> Self {
        let mut bytes = vec![0u8; NODE_ID_LEN];
        getrandom::getrandom(&mut bytes).expect("OS random source unavailable");
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| TypesError::InvalidHex(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "NodeId({})", &hex[..hex.len().min(8)])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
