//! Beacon (tourist device) transmitter

use crate::api::pause;
use crate::hardware::{CommResult, RadioTransceiver};
use crate::processing::RadioMessage;
use crate::utils::config::BeaconConfig;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Pings that carry SOS in drill mode
const DRILL_SOS_PINGS: RangeInclusive<u64> = 5..=7;

/// Where the beacon learns whether SOS is asserted
pub enum SosSource {
    /// Never signal SOS
    Off,
    /// Polled before every transmission
    Input(Box<dyn FnMut() -> bool + Send>),
    /// Signal SOS on pings 5, 6 and 7 only
    Drill,
}

impl fmt::Debug for SosSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SosSource::Off => f.write_str("Off"),
            SosSource::Input(_) => f.write_str("Input(..)"),
            SosSource::Drill => f.write_str("Drill"),
        }
    }
}

pub struct BeaconTransmitter<R> {
    radio: R,
    device_id: String,
    interval: Duration,
    sos: SosSource,
    ping_count: u64,
}

impl<R: RadioTransceiver> BeaconTransmitter<R> {
    pub fn new(radio: R, device_id: &str, config: &BeaconConfig, sos: SosSource) -> Self {
        Self {
            radio,
            device_id: device_id.trim().to_uppercase(),
            interval: Duration::from_millis(config.ping_interval_ms),
            sos,
            ping_count: 0,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn ping_count(&self) -> u64 {
        self.ping_count
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Message for the next transmission
    pub fn next_message(&mut self) -> RadioMessage {
        self.ping_count += 1;
        let sos = match &mut self.sos {
            SosSource::Off => false,
            SosSource::Input(pressed) => pressed(),
            SosSource::Drill => DRILL_SOS_PINGS.contains(&self.ping_count),
        };

        let device_id = self.device_id.clone();
        if sos {
            RadioMessage::Sos { device_id }
        } else {
            RadioMessage::Ping { device_id }
        }
    }

    /// Build and send the next message
    pub fn transmit(&mut self) -> CommResult<RadioMessage> {
        let message = self.next_message();
        self.radio.send(message.to_string().as_bytes())?;

        match &message {
            RadioMessage::Sos { .. } => {
                warn!(count = self.ping_count, payload = %message, "sent SOS")
            }
            _ => info!(count = self.ping_count, payload = %message, "sent ping"),
        }
        Ok(message)
    }

    /// Transmit every ping interval until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            device = %self.device_id,
            interval_ms = self.interval.as_millis() as u64,
            sos = ?self.sos,
            "beacon started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.transmit() {
                warn!(radio = %self.radio.name(), error = %e, "beacon transmit failed");
            }
            if !pause(shutdown, self.interval) {
                break;
            }
        }

        info!(device = %self.device_id, sent = self.ping_count, "beacon stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockRadio;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn beacon(sos: SosSource) -> BeaconTransmitter<MockRadio> {
        BeaconTransmitter::new(MockRadio::new("tx"), "dev001", &BeaconConfig::default(), sos)
    }

    #[test]
    fn test_plain_pings() {
        let mut tx = beacon(SosSource::Off);
        tx.transmit().unwrap();
        tx.transmit().unwrap();
        assert_eq!(tx.radio().sent_text(), vec!["PING:DEV001", "PING:DEV001"]);
    }

    #[test]
    fn test_drill_schedule() {
        let mut tx = beacon(SosSource::Drill);
        let sos: Vec<bool> = (0..9)
            .map(|_| matches!(tx.next_message(), RadioMessage::Sos { .. }))
            .collect();
        assert_eq!(sos, [false, false, false, false, true, true, true, false, false]);
    }

    #[test]
    fn test_sos_input() {
        let presses = Arc::new(AtomicUsize::new(0));
        let counter = presses.clone();
        let mut tx = beacon(SosSource::Input(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst) == 1
        })));

        assert_eq!(tx.transmit().unwrap(), RadioMessage::Ping { device_id: "DEV001".into() });
        assert_eq!(tx.transmit().unwrap(), RadioMessage::Sos { device_id: "DEV001".into() });
        assert_eq!(presses.load(Ordering::SeqCst), 2);
        assert_eq!(tx.radio().sent_text()[1], "SOS:DEV001");
    }

    #[test]
    fn test_transmit_error_propagates() {
        let mut radio = MockRadio::new("tx");
        radio.disconnect();
        let mut tx = BeaconTransmitter::new(radio, "dev001", &BeaconConfig::default(), SosSource::Off);
        assert!(tx.transmit().is_err());
    }
}
