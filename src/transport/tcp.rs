//! TCP byte-stream transport.
//!
//! Grounded on the teacher's `conn.rs` (`TcpStream` + read-timeout based
//! polling), generalized from a fixed device address into a generic
//! `Transport` implementation.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{Result, Transport, TransportError};

pub struct TcpTransport {
    addr: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), stream: None }
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotInitialized)
    }
}

impl Transport for TcpTransport {
    fn init(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(TransportError::AlreadyInit);
        }
        let stream = self
            .addr
            .as_str()
            .to_socket_addrs()
            .map_err(|e| TransportError::IoError(e.to_string()))?
            .next()
            .ok_or_else(|| TransportError::IoError("no address resolved".into()))
            .and_then(|a| TcpStream::connect(a).map_err(|e| TransportError::IoError(e.to_string())))?;
        let _ = stream.set_nodelay(true);
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream_mut()?.write_all(bytes).map_err(|e| TransportError::IoError(e.to_string()))
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream_mut()?;
        let read_timeout = if timeout.is_zero() { Some(Duration::from_millis(1)) } else { Some(timeout) };
        stream.set_read_timeout(read_timeout).map_err(|e| TransportError::IoError(e.to_string()))?;
        match stream.read(buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                if timeout.is_zero() {
                    Ok(0)
                } else {
                    Err(TransportError::Timeout)
                }
            }
            Err(e) => Err(TransportError::IoError(e.to_string())),
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.stream_mut()?.flush().map_err(|e| TransportError::IoError(e.to_string()))
    }
}
