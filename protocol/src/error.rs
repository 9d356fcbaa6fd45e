use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown packet type: {0:#04x}")]
    UnknownType(u8),

    #[error("payload size mismatch: declared {declared}, decoded {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("payload too large: {size} > {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}
