//! Frame encoding and the streaming frame decoder.
//!
//! Wire format (little-endian, packed):
//! ```text
//! 0xAA 0x55 | len:u16 | type:u8 | payload[len-1] | crc:u32
//! ```
//! `len` counts `type + payload`. `crc` is CRC-32-IEEE over `type || payload`.
//!
//! Grounded on `original_source/firmware/common/protocol/frameCodec.hpp`: a
//! two-byte magic sync lets a fresh listener join mid-stream, a length field
//! (rather than byte-stuffing) keeps the decoder linear in frame size, and the
//! CRC covers only `type + payload` so a framing corruption (bad length) is
//! rejected before CRC is computed over a misaligned region.

use crate::crc32;
use crate::error::{Result, WireError};

const START0: u8 = 0xAA;
const START1: u8 = 0x55;

/// Maximum payload length in bytes.
pub const MAX_PAYLOAD: usize = 1024;
/// Maximum `type + payload` length (the wire `len` field).
pub const MAX_DATA: usize = MAX_PAYLOAD + 1;
/// Maximum total encoded frame length.
pub const MAX_FRAME: usize = 2 + 2 + MAX_DATA + 4;

/// A decoded frame: message type and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub type_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(type_id: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLong { len: payload.len(), max: MAX_PAYLOAD });
        }
        Ok(Self { type_id, payload })
    }

    /// Encode this frame into its complete wire representation.
    ///
    /// Encoding is deterministic: two calls on equal frames produce equal
    /// bytes (spec.md §8 "Laws").
    pub fn encode(&self) -> Vec<u8> {
        let data_len = 1 + self.payload.len();
        let mut wire = Vec::with_capacity(2 + 2 + data_len + 4);
        wire.push(START0);
        wire.push(START1);
        wire.extend_from_slice(&(data_len as u16).to_le_bytes());
        wire.push(self.type_id);
        wire.extend_from_slice(&self.payload);

        let mut crc = crc32::update(crc32::INIT, &[self.type_id]);
        crc = crc32::update(crc, &self.payload);
        let crc = crc32::finalize(crc);
        wire.extend_from_slice(&crc.to_le_bytes());
        wire
    }
}

/// Decoder state, matching `frameCodec.hpp`'s `FrameDecoder::State` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    WaitStart0,
    WaitStart1,
    WaitLenLow,
    WaitLenHigh,
    ReceiveData,
    WaitCrc,
    Complete,
    Error,
}

/// A byte-at-a-time streaming frame decoder.
///
/// Feed bytes one at a time with [`feed_byte`](Self::feed_byte) (or a slice
/// with [`feed`](Self::feed)). Once [`state`](Self::state) reaches
/// `Complete` or `Error`, call [`reset`](Self::reset) before feeding more
/// bytes — further bytes are ignored in a terminal state.
pub struct FrameDecoder {
    state: DecoderState,
    len: u16,
    data: Vec<u8>,
    crc_bytes: [u8; 4],
    crc_index: usize,
    last_error: Option<WireError>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::WaitStart0,
            len: 0,
            data: Vec::new(),
            crc_bytes: [0; 4],
            crc_index: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::Complete
    }

    pub fn is_error(&self) -> bool {
        self.state == DecoderState::Error
    }

    /// The error that drove the decoder into `Error`, if any.
    pub fn last_error(&self) -> Option<&WireError> {
        self.last_error.as_ref()
    }

    /// Reset to `WaitStart0`, ready to decode the next frame.
    pub fn reset(&mut self) {
        self.state = DecoderState::WaitStart0;
        self.len = 0;
        self.data.clear();
        self.crc_index = 0;
        self.last_error = None;
    }

    /// The decoded frame once `state() == Complete`.
    pub fn take_frame(&self) -> Option<Frame> {
        if !self.is_complete() || self.data.is_empty() {
            return None;
        }
        Some(Frame { type_id: self.data[0], payload: self.data[1..].to_vec() })
    }

    /// Feed a slice of bytes, stopping early if a terminal state is reached.
    /// Returns the number of bytes consumed.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        let mut consumed = 0;
        for &b in data {
            if self.is_complete() || self.is_error() {
                break;
            }
            self.feed_byte(b);
            consumed += 1;
        }
        consumed
    }

    /// Feed a single byte, advancing the state machine.
    pub fn feed_byte(&mut self, byte: u8) {
        match self.state {
            DecoderState::WaitStart0 => {
                if byte == START0 {
                    self.state = DecoderState::WaitStart1;
                }
                // else stay in WaitStart0
            }
            DecoderState::WaitStart1 => {
                if byte == START1 {
                    self.state = DecoderState::WaitLenLow;
                } else if byte == START0 {
                    // Re-sync on 0xAA 0xAA: stay, treating the new byte as
                    // a fresh candidate start0.
                } else {
                    self.state = DecoderState::WaitStart0;
                }
            }
            DecoderState::WaitLenLow => {
                self.len = byte as u16;
                self.state = DecoderState::WaitLenHigh;
            }
            DecoderState::WaitLenHigh => {
                self.len |= (byte as u16) << 8;
                if self.len == 0 || self.len as usize > MAX_DATA {
                    self.last_error = Some(WireError::LengthOutOfRange {
                        len: self.len,
                        max: MAX_DATA as u16,
                    });
                    self.state = DecoderState::Error;
                } else {
                    self.data = Vec::with_capacity(self.len as usize);
                    self.state = DecoderState::ReceiveData;
                }
            }
            DecoderState::ReceiveData => {
                self.data.push(byte);
                if self.data.len() == self.len as usize {
                    self.crc_index = 0;
                    self.state = DecoderState::WaitCrc;
                }
            }
            DecoderState::WaitCrc => {
                self.crc_bytes[self.crc_index] = byte;
                self.crc_index += 1;
                if self.crc_index == 4 {
                    let expected = u32::from_le_bytes(self.crc_bytes);
                    let computed = crc32::crc32(&self.data);
                    if expected == computed {
                        self.state = DecoderState::Complete;
                    } else {
                        self.last_error = Some(WireError::CrcMismatch { expected, computed });
                        self.state = DecoderState::Error;
                    }
                }
            }
            DecoderState::Complete | DecoderState::Error => {
                // Terminal; ignore further bytes (callers must reset()).
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a single complete wire frame from a byte slice (convenience
/// wrapper over [`FrameDecoder`] for callers that already have the whole
/// frame in hand, e.g. tests).
pub fn decode_one(wire: &[u8]) -> Result<Frame> {
    let mut decoder = FrameDecoder::new();
    decoder.feed(wire);
    if decoder.is_complete() {
        Ok(decoder.take_frame().expect("complete decoder always has a frame"))
    } else {
        Err(decoder.last_error.unwrap_or(WireError::FrameTooShort { len: wire.len(), min: 9 }))
    }
}
