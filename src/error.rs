use thiserror::Error;

/// Errors from frame encoding and decoding.
///
/// Distinct from [`crate::transport::TransportError`]: a `WireError` is a
/// framing defect (bad length, CRC mismatch) and never implies anything about
/// the channel carrying the bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("payload too long ({len} bytes, max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("frame too short ({len} bytes, minimum {min})")]
    FrameTooShort { len: usize, min: usize },

    #[error("declared length {len} exceeds max payload+type ({max})")]
    LengthOutOfRange { len: u16, max: u16 },

    #[error("declared length is zero")]
    ZeroLength,

    #[error("CRC mismatch (expected 0x{expected:08X}, computed 0x{computed:08X})")]
    CrcMismatch { expected: u32, computed: u32 },

    #[error("decoder fed a byte after reaching a terminal state")]
    FeedAfterTerminal,

    #[error("invalid UTF-8 in version string: {0}")]
    InvalidString(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
