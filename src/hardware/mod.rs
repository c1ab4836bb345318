//! Radio transceiver boundary
//!
//! The positioning core only sees the [`RadioTransceiver`] trait. Concrete
//! radios: a scripted mock for tests, a random simulator for running without
//! hardware, and SX126x-style serial framing over any byte port.

pub mod transceiver;
pub mod serial;
pub mod simulated;
pub mod mock;
pub mod error;

pub use transceiver::{RadioTransceiver, TransceiverStatus};
pub use serial::SerialRadio;
pub use simulated::SimulatedRadio;
pub use mock::MockRadio;
pub use error::{CommError, CommResult, RecoveryStrategy};

use std::borrow::Cow;
use std::time::Instant;

/// Packet received from the radio together with its measured signal strength
#[derive(Debug, Clone, PartialEq)]
pub struct RadioPacket {
    pub data: Vec<u8>,
    pub rssi_dbm: i32,
    pub received_at: Instant,
}

impl RadioPacket {
    pub fn new(data: Vec<u8>, rssi_dbm: i32) -> Self {
        Self {
            data,
            rssi_dbm,
            received_at: Instant::now(),
        }
    }

    pub fn text(message: &str, rssi_dbm: i32) -> Self {
        Self::new(message.as_bytes().to_vec(), rssi_dbm)
    }

    pub fn with_received_at(mut self, received_at: Instant) -> Self {
        self.received_at = received_at;
        self
    }

    /// Payload decoded as UTF-8, invalid sequences replaced
    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}
