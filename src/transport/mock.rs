//! In-memory transport pair for tests and demos (no real I/O).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Result, Transport, TransportError};

#[derive(Default)]
struct Channel {
    queue: VecDeque<u8>,
    connected: bool,
}

/// One end of an in-memory byte pipe. Create a connected pair with
/// [`mock_pair`].
pub struct InMemoryTransport {
    inbox: Arc<Mutex<Channel>>,
    outbox: Arc<Mutex<Channel>>,
}

/// Build two ends of an in-memory transport, already connected.
pub fn mock_pair() -> (InMemoryTransport, InMemoryTransport) {
    let a_to_b = Arc::new(Mutex::new(Channel { queue: VecDeque::new(), connected: true }));
    let b_to_a = Arc::new(Mutex::new(Channel { queue: VecDeque::new(), connected: true }));
    (
        InMemoryTransport { inbox: b_to_a.clone(), outbox: a_to_b.clone() },
        InMemoryTransport { inbox: a_to_b, outbox: b_to_a },
    )
}

impl Transport for InMemoryTransport {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut outbox = self.outbox.lock().unwrap();
        if !outbox.connected {
            return Err(TransportError::Disconnected);
        }
        outbox.queue.extend(bytes.iter().copied());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut inbox = self.inbox.lock().unwrap();
        if inbox.queue.is_empty() {
            if inbox.connected {
                return Err(TransportError::Timeout);
            }
            return Err(TransportError::Disconnected);
        }
        let mut n = 0;
        while n < buf.len() {
            match inbox.queue.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn is_connected(&self) -> bool {
        self.outbox.lock().unwrap().connected
    }

    fn disconnect(&mut self) {
        self.outbox.lock().unwrap().connected = false;
        self.inbox.lock().unwrap().connected = false;
    }

    fn available(&self) -> usize {
        self.inbox.lock().unwrap().queue.len()
    }
}
