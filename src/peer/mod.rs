//! Peer-to-peer game service: beacon discovery, MAC-ordered role election,
//! and the master/slave drill loop (spec.md §4.5).

mod service;

pub use service::{DiscoveryOutcome, DrillTarget, PeerService, Role, RoundOutcome, SlaveHandoff};

use crate::error::{Result, WireError};

pub const TYPE_BEACON: u8 = 0x01;
pub const TYPE_PING: u8 = 0x02;
pub const TYPE_PONG: u8 = 0x03;
pub const TYPE_JOIN_GAME: u8 = 0x10;
pub const TYPE_ARM_TOUCH: u8 = 0x11;
pub const TYPE_SET_COLOR: u8 = 0x12;
pub const TYPE_STOP_ALL: u8 = 0x13;
pub const TYPE_TOUCH_EVENT: u8 = 0x20;
pub const TYPE_TIMEOUT_EVENT: u8 = 0x21;

pub const BROADCAST_MAC: [u8; 6] = [0xFF; 6];

pub const HEADER_LEN: usize = 11;

/// Every peer-service radio message shares this 11-byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    pub msg_type: u8,
    pub sender_mac: [u8; 6],
    pub timestamp_us: u32,
}

impl MsgHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.msg_type;
        buf[1..7].copy_from_slice(&self.sender_mac);
        buf[7..11].copy_from_slice(&self.timestamp_us.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::FrameTooShort { len: bytes.len(), min: HEADER_LEN });
        }
        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&bytes[1..7]);
        Ok(Self {
            msg_type: bytes[0],
            sender_mac,
            timestamp_us: u32::from_le_bytes(bytes[7..11].try_into().unwrap()),
        })
    }
}

/// `ArmTouch (0x11)`: `timeoutMs:u32 | feedbackMode:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmTouchBody {
    pub timeout_ms: u32,
    pub feedback_mode: u8,
}

impl ArmTouchBody {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.timeout_ms.to_le_bytes().to_vec();
        buf.push(self.feedback_mode);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 5 {
            return Err(WireError::FrameTooShort { len: bytes.len(), min: 5 });
        }
        Ok(Self {
            timeout_ms: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            feedback_mode: bytes[4],
        })
    }
}

/// `SetColor (0x12)`: `r:u8 | g:u8 | b:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetColorBody {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl SetColorBody {
    pub fn encode(&self) -> Vec<u8> {
        vec![self.r, self.g, self.b]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 3 {
            return Err(WireError::FrameTooShort { len: bytes.len(), min: 3 });
        }
        Ok(Self { r: bytes[0], g: bytes[1], b: bytes[2] })
    }
}

/// `TouchEvent (0x20)`: `reactionTimeUs:u32 | padIndex:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEventBody {
    pub reaction_time_us: u32,
    pub pad_index: u8,
}

impl TouchEventBody {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.reaction_time_us.to_le_bytes().to_vec();
        buf.push(self.pad_index);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 5 {
            return Err(WireError::FrameTooShort { len: bytes.len(), min: 5 });
        }
        Ok(Self {
            reaction_time_us: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            pad_index: bytes[4],
        })
    }
}

/// A discovered peer pod (spec.md §3, up to 8 per table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub mac: [u8; 6],
    pub first_seen_us: u64,
    pub last_seen_us: u64,
    pub beacon_count: u32,
    pub last_rtt_us: Option<u64>,
    pub ping_sent: bool,
    pub ping_sent_at_us: u64,
}

pub const MAX_PEERS: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = MsgHeader { msg_type: TYPE_PING, sender_mac: [1, 2, 3, 4, 5, 6], timestamp_us: 123_456 };
        let decoded = MsgHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn arm_touch_round_trip() {
        let body = ArmTouchBody { timeout_ms: 3000, feedback_mode: 0x03 };
        assert_eq!(ArmTouchBody::decode(&body.encode()).unwrap(), body);
    }

    #[test]
    fn touch_event_round_trip() {
        let body = TouchEventBody { reaction_time_us: 150_000, pad_index: 2 };
        assert_eq!(TouchEventBody::decode(&body.encode()).unwrap(), body);
    }
}
