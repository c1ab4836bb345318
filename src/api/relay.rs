//! Relay anchor: forwards what it hears of the beacon to the gateway
//!
//! Relays answer each direct ping with `REPORT:<self>:<rssi>` after a delay
//! proportional to their slot in the anchor order, so that two relays hearing
//! the same ping do not transmit at the same instant.

use crate::api::pause;
use crate::core::AnchorId;
use crate::hardware::{CommResult, RadioPacket, RadioTransceiver, RecoveryStrategy};
use crate::processing::{MessageParser, RadioMessage};
use crate::utils::config::{ConfigError, SystemConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Running median over the most recent RSSI samples
#[derive(Debug, Clone)]
pub struct RssiSmoother {
    window: usize,
    samples: VecDeque<i32>,
}

impl RssiSmoother {
    pub fn new(window: usize) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "smoothing_window".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            window,
            samples: VecDeque::with_capacity(window),
        })
    }

    /// Add a sample and return the median of the window.
    ///
    /// An even-sized window averages the two middle samples.
    pub fn push(&mut self, rssi_dbm: i32) -> i32 {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(rssi_dbm);

        let mut sorted: Vec<i32> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            ((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0).round() as i32
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

pub struct RelayForwarder<R> {
    radio: R,
    anchor_id: AnchorId,
    parser: MessageParser,
    smoother: RssiSmoother,
    report_delay: Duration,
    poll_interval: Duration,
    forwarded: u64,
}

impl<R: RadioTransceiver> RelayForwarder<R> {
    /// Create the relay for `config.local_anchor`.
    ///
    /// The first anchor in the order is the gateway and cannot relay.
    pub fn new(radio: R, config: &SystemConfig) -> Result<Self, ConfigError> {
        let anchor_id = config.local_anchor.clone();
        let slot = config.slot_of(&anchor_id).ok_or_else(|| ConfigError::AnchorConflict {
            reason: format!("relay {} is not in the anchor order", anchor_id),
        })?;
        if slot == 0 {
            return Err(ConfigError::AnchorConflict {
                reason: format!("{} is the gateway anchor and does not relay", anchor_id),
            });
        }

        Ok(Self {
            radio,
            anchor_id,
            parser: MessageParser::new(),
            smoother: RssiSmoother::new(config.relay.smoothing_window)?,
            report_delay: Duration::from_millis(config.relay.report_delay_ms * slot as u64),
            poll_interval: Duration::from_millis(config.relay.poll_interval_ms),
            forwarded: 0,
        })
    }

    pub fn anchor_id(&self) -> &AnchorId {
        &self.anchor_id
    }

    /// Delay between hearing a ping and sending the report
    pub fn report_delay(&self) -> Duration {
        self.report_delay
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Report text to send for a received packet, if it was a direct ping
    pub fn handle_packet(&mut self, packet: &RadioPacket) -> Option<String> {
        let message = packet.message();
        match self.parser.parse(&message) {
            Ok(parsed) if parsed.is_direct() => {
                let rssi_dbm = self.smoother.push(packet.rssi_dbm);
                debug!(payload = %parsed, raw_rssi = packet.rssi_dbm, rssi_dbm, "heard beacon");
                RadioMessage::Report {
                    anchor_id: self.anchor_id.clone(),
                    rssi_dbm,
                }
                .to_wire()
            }
            Ok(_) => None,
            Err(e) => {
                debug!(payload = %message.trim(), error = %e, "ignoring malformed message");
                None
            }
        }
    }

    /// Receive one packet and forward it if needed, after the slot delay.
    /// Returns whether a report was sent.
    pub fn step(&mut self, shutdown: &AtomicBool) -> CommResult<bool> {
        let Some(packet) = self.radio.receive()? else {
            return Ok(false);
        };
        let Some(report) = self.handle_packet(&packet) else {
            return Ok(false);
        };

        if !pause(shutdown, self.report_delay) {
            return Ok(false);
        }
        self.radio.send(report.as_bytes())?;
        self.forwarded += 1;
        info!(report = %report, "forwarded report");
        Ok(true)
    }

    /// Loop until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            anchor = %self.anchor_id,
            delay_ms = self.report_delay.as_millis() as u64,
            smoothing_window = self.smoother.window(),
            "relay started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            let mut wait = self.poll_interval;
            if let Err(e) = self.step(shutdown) {
                warn!(radio = %self.radio.name(), error = %e, "relay radio error");
                if let RecoveryStrategy::RetryWithDelay { delay_ms } = e.recovery_strategy() {
                    wait = Duration::from_millis(delay_ms as u64);
                }
            }
            if !pause(shutdown, wait) {
                break;
            }
        }

        info!(anchor = %self.anchor_id, forwarded = self.forwarded, "relay stopped");
    }
}
