//! DOMES: framed transport, OTA update, runtime configuration, a per-pod
//! game engine, peer discovery/drill coordination, and a trace recorder for
//! reaction-drill pod firmware.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod crc32;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod game;
pub mod ota;
pub mod peer;
pub mod task;
pub mod trace;
pub mod transport;

pub use clock::{Clock, MockClock, SharedMockClock, SystemClock};
pub use error::WireError;
pub use frame::{Frame, FrameDecoder};
pub use task::TaskHandle;
pub use transport::{Transport, TransportError};
