//! Transceiver interface trait and status

use crate::hardware::{CommResult, RadioPacket};

/// Capability interface for a packet radio that reports signal strength
pub trait RadioTransceiver {
    /// Poll for a received packet.
    /// Returns Ok(None) when nothing is pending; must not block for long.
    fn receive(&mut self) -> CommResult<Option<RadioPacket>>;

    /// Transmit a packet. Fire-and-forget: success means the bytes were
    /// handed to the radio, not that anyone heard them.
    fn send(&mut self, data: &[u8]) -> CommResult<()>;

    /// Get current transceiver status
    fn status(&self) -> TransceiverStatus;

    /// Human-readable radio name for logs
    fn name(&self) -> &str;
}

impl<T: RadioTransceiver + ?Sized> RadioTransceiver for Box<T> {
    fn receive(&mut self) -> CommResult<Option<RadioPacket>> {
        (**self).receive()
    }

    fn send(&mut self, data: &[u8]) -> CommResult<()> {
        (**self).send(data)
    }

    fn status(&self) -> TransceiverStatus {
        (**self).status()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Transceiver status counters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransceiverStatus {
    pub connected: bool,
    pub messages_received: u32,
    pub messages_sent: u32,
    pub error_count: u32,
    pub last_rssi_dbm: Option<i32>,
}

impl TransceiverStatus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.connected && self.error_count < 10
    }

    pub(crate) fn record_received(&mut self, packet: &RadioPacket) {
        self.messages_received += 1;
        self.last_rssi_dbm = Some(packet.rssi_dbm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_health() {
        let mut status = TransceiverStatus::connected();
        assert!(status.is_healthy());
        status.error_count = 10;
        assert!(!status.is_healthy());
        assert!(!TransceiverStatus::default().is_healthy());
    }

    #[test]
    fn test_record_received() {
        let mut status = TransceiverStatus::connected();
        status.record_received(&RadioPacket::text("PING:DEV001", -61));
        assert_eq!(status.messages_received, 1);
        assert_eq!(status.last_rssi_dbm, Some(-61));
    }
}
