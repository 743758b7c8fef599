//! Transport contract (spec.md §4.6) and concrete implementations.

mod mock;
mod tcp;

pub use mock::{InMemoryTransport, mock_pair};
pub use tcp::TcpTransport;

use std::time::Duration;
use thiserror::Error;

/// Shared transport-layer error taxonomy (spec.md §7).
///
/// This is the currency among all framed-protocol layers; it is distinct from
/// [`crate::ota::OtaStatus`] and [`crate::config::ConfigStatus`], which are
/// carried in reply payloads rather than returned as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("operation timed out")]
    Timeout,
    #[error("transport disconnected")]
    Disconnected,
    #[error("invalid argument")]
    InvalidArg,
    #[error("buffer full")]
    BufferFull,
    #[error("buffer empty")]
    BufferEmpty,
    #[error("CRC mismatch")]
    CrcMismatch,
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("transport not initialized")]
    NotInitialized,
    #[error("transport already initialized")]
    AlreadyInit,
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("out of memory")]
    NoMemory,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Abstract bidirectional byte channel (spec.md §4.6).
///
/// All concrete transports (USB-CDC, TCP, BLE GATT, radio datagram)
/// implement this. `flush` and `available` have default no-op/zero
/// implementations for transports that don't need them, matching
/// `original_source/firmware/common/interfaces/iTransport.hpp`'s optional
/// overrides.
pub trait Transport {
    /// Open the underlying channel.
    fn init(&mut self) -> Result<()>;

    /// Block until all of `bytes` are accepted by the channel.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes, returning the number read.
    ///
    /// `timeout == Duration::ZERO` is non-blocking: read what's immediately
    /// available and return `0` rather than blocking.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    fn is_connected(&self) -> bool;

    /// Idempotent teardown.
    fn disconnect(&mut self);

    /// Block until the outbound queue is drained. Default: no-op.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Best-effort count of immediately-readable bytes. Default: `0`.
    fn available(&self) -> usize {
        0
    }
}
