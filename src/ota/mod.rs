//! OTA firmware update protocol (spec.md §4.2).
//!
//! Frame types `Begin (0x01) | Data (0x02) | End (0x03) | Ack (0x04) | Abort
//! (0x05)`. Host sends `Begin`/`Data`/`End`/`Abort`; the receiver sends
//! `Ack`/`Abort`.

mod partition;
mod session;

pub use partition::{PartitionId, PartitionWriter, PartitionWriterError, WriterHandle};
pub use session::{OtaOutcome, OtaReceiver, OtaSession, sha256_of};

use crate::error::{Result, WireError};

pub const TYPE_BEGIN: u8 = 0x01;
pub const TYPE_DATA: u8 = 0x02;
pub const TYPE_END: u8 = 0x03;
pub const TYPE_ACK: u8 = 0x04;
pub const TYPE_ABORT: u8 = 0x05;

pub fn is_ota_message(type_id: u8) -> bool {
    (TYPE_BEGIN..=TYPE_ABORT).contains(&type_id)
}

/// OTA failure taxonomy, carried in `Ack`/`Abort` payloads (spec.md §4.2).
///
/// Distinct from [`crate::transport::TransportError`] — this is a status
/// code in a reply, never a `Result::Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OtaStatus {
    Ok = 0,
    Busy = 1,
    FlashError = 2,
    VerifyFailed = 3,
    SizeMismatch = 4,
    OffsetMismatch = 5,
    VersionError = 6,
    PartitionError = 7,
    Aborted = 8,
}

impl OtaStatus {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::Ok,
            1 => Self::Busy,
            2 => Self::FlashError,
            3 => Self::VerifyFailed,
            4 => Self::SizeMismatch,
            5 => Self::OffsetMismatch,
            6 => Self::VersionError,
            7 => Self::PartitionError,
            8 => Self::Aborted,
            _ => return None,
        })
    }
}

/// `Begin`: `size:u32 | sha256:[u8;32] | version:utf8<=32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginMsg {
    pub size: u32,
    pub sha256: [u8; 32],
    pub version: String,
}

impl BeginMsg {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 36 {
            return Err(WireError::FrameTooShort { len: payload.len(), min: 36 });
        }
        let size = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&payload[4..36]);
        let version = String::from_utf8(payload[36..].to_vec())
            .map_err(|e| WireError::InvalidString(e.to_string()))?;
        Ok(Self { size, sha256, version })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(36 + self.version.len());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.sha256);
        buf.extend_from_slice(self.version.as_bytes());
        buf
    }
}

/// `Data`: `offset:u32 | len:u16 | bytes[len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMsg {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

impl DataMsg {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 6 {
            return Err(WireError::FrameTooShort { len: payload.len(), min: 6 });
        }
        let offset = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let len = u16::from_le_bytes(payload[4..6].try_into().unwrap()) as usize;
        if payload.len() < 6 + len {
            return Err(WireError::FrameTooShort { len: payload.len(), min: 6 + len });
        }
        Ok(Self { offset, bytes: payload[6..6 + len].to_vec() })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.bytes.len());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&(self.bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.bytes);
        buf
    }
}

/// `Ack`: `status:u8 | nextOffset:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMsg {
    pub status: OtaStatus,
    pub next_offset: u32,
}

impl AckMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5);
        buf.push(self.status as u8);
        buf.extend_from_slice(&self.next_offset.to_le_bytes());
        buf
    }
}

/// `Abort`: `reason:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortMsg {
    pub reason: OtaStatus,
}

impl AbortMsg {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let reason = payload
            .first()
            .and_then(|&b| OtaStatus::from_byte(b))
            .ok_or(WireError::FrameTooShort { len: payload.len(), min: 1 })?;
        Ok(Self { reason })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![self.reason as u8]
    }
}
