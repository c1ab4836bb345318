//! Randomized radio for running nodes without hardware
//!
//! Each poll has a fixed chance of "hearing" either the beacon directly or a
//! relay report, with plausible signal strengths. Transmissions are logged and
//! discarded.

use crate::core::AnchorId;
use crate::hardware::{CommResult, RadioPacket, RadioTransceiver, TransceiverStatus};
use crate::processing::parser::RadioMessage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use tracing::debug;

/// RSSI range of the beacon as heard by an anchor
const BEACON_RSSI_DBM: RangeInclusive<i32> = -90..=-40;
/// RSSI range of anchor-to-anchor links
const LINK_RSSI_DBM: RangeInclusive<i32> = -60..=-30;

/// Simulated radio producing random pings and relay reports
pub struct SimulatedRadio {
    name: String,
    device_id: String,
    relays: Vec<AnchorId>,
    receive_probability: f64,
    rng: StdRng,
    status: TransceiverStatus,
}

impl SimulatedRadio {
    /// Create a simulator that hears `device_id` directly and reports from `relays`
    pub fn new(name: &str, device_id: &str, relays: Vec<AnchorId>) -> Self {
        Self {
            name: name.to_string(),
            device_id: device_id.trim().to_uppercase(),
            relays,
            receive_probability: 0.2,
            rng: StdRng::from_entropy(),
            status: TransceiverStatus::connected(),
        }
    }

    /// Use a fixed seed for reproducible traffic
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Chance per poll of receiving a packet, clamped to 0.0..=1.0
    pub fn with_receive_probability(mut self, probability: f64) -> Self {
        self.receive_probability = probability.clamp(0.0, 1.0);
        self
    }

    fn next_packet(&mut self) -> RadioPacket {
        let heard_rssi = self.rng.gen_range(BEACON_RSSI_DBM);
        let pick = self.rng.gen_range(0..=self.relays.len());

        if pick == 0 {
            let message = RadioMessage::Ping {
                device_id: self.device_id.clone(),
            };
            RadioPacket::text(&message.to_string(), heard_rssi)
        } else {
            let message = RadioMessage::Report {
                anchor_id: self.relays[pick - 1].clone(),
                rssi_dbm: heard_rssi,
            };
            let link_rssi = self.rng.gen_range(LINK_RSSI_DBM);
            RadioPacket::text(&message.to_string(), link_rssi)
        }
    }
}

impl RadioTransceiver for SimulatedRadio {
    fn receive(&mut self) -> CommResult<Option<RadioPacket>> {
        if !self.rng.gen_bool(self.receive_probability) {
            return Ok(None);
        }

        let packet = self.next_packet();
        self.status.record_received(&packet);
        Ok(Some(packet))
    }

    fn send(&mut self, data: &[u8]) -> CommResult<()> {
        debug!(radio = %self.name, payload = %String::from_utf8_lossy(data), "simulated transmit");
        self.status.messages_sent += 1;
        Ok(())
    }

    fn status(&self) -> TransceiverStatus {
        self.status.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
