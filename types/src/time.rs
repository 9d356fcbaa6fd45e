//! Timestamp type carried in every packet header.
//!
//! Timestamps are Unix epoch milliseconds stored as `f64`, matching the
//! 8-byte big-endian float in the frame header. Sub-millisecond precision
//! is kept when present so a decoded header round-trips bit-for-bit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn from_millis(ms: f64) -> Self {
        Self(ms)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis();
        Self(ms as f64)
    }

    pub fn as_millis(&self) -> f64 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(f64::from_be_bytes(bytes))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        assert!(Timestamp::now().as_millis() > 1_577_836_800_000.0);
    }

    #[test]
    fn be_bytes_roundtrip_preserves_fraction() {
        let ts = Timestamp::from_millis(1_700_000_000_123.5);
        assert_eq!(Timestamp::from_be_bytes(ts.to_be_bytes()), ts);
    }
}
