//! Dispatch-loop error counters, exposed read-only for observability.
//!
//! Not named in spec.md's data model, but implied by spec.md §7's
//! propagation policy ("CrcMismatch and ProtocolError are counted in
//! diagnostics"). Ambient observability, not a feature a Non-goal excludes.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub struct Diagnostics {
    crc_errors: AtomicU32,
    protocol_errors: AtomicU32,
    io_errors: AtomicU32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_crc_error(&self) {
        self.crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn crc_errors(&self) -> u32 {
        self.crc_errors.load(Ordering::Relaxed)
    }

    pub fn protocol_errors(&self) -> u32 {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    pub fn io_errors(&self) -> u32 {
        self.io_errors.load(Ordering::Relaxed)
    }
}
