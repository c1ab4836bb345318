//! Per-cycle collection of anchor readings
//!
//! The aggregator moves through three states:
//!
//! ```text
//! EMPTY --ingest--> PARTIAL --ingest--> COMPLETE --drain--> EMPTY
//!                      |
//!                      +--check_timeout (stale)--> EMPTY
//! ```
//!
//! Each anchor holds at most one reading per cycle; a newer reading from the
//! same anchor replaces the older one.

use crate::core::{AnchorId, DeviceTag, SignalReading};
use crate::processing::parser::{MessageParser, ParseError, RadioMessage};
use crate::utils::config::{ConfigError, SystemConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Aggregation state for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Empty,
    Partial,
    Complete,
}

/// Result of a successful ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A reading was stored under this anchor
    Recorded { anchor_id: AnchorId },
    /// Traffic that is not part of the protocol
    Ignored,
}

/// Reasons an inbound message was dropped without touching state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("malformed message: {0}")]
    Malformed(#[from] ParseError),
    #[error("report from unconfigured anchor {anchor_id}")]
    UnknownAnchor { anchor_id: AnchorId },
}

/// A full reading set taken out of the aggregator
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCycle {
    /// One reading per anchor, in canonical anchor order
    pub readings: [SignalReading; 3],
    /// Device identity from the latest direct ping, if one was heard
    pub device: Option<DeviceTag>,
}

/// Collects readings from the three anchors into one cycle
#[derive(Debug)]
pub struct ReadingAggregator {
    anchor_ids: [AnchorId; 3],
    local_anchor: AnchorId,
    parser: MessageParser,
    readings: HashMap<AnchorId, SignalReading>,
    device: Option<DeviceTag>,
    last_activity: Option<Instant>,
}

impl ReadingAggregator {
    /// Create an aggregator for the given canonical anchor order.
    ///
    /// `local_anchor` is the anchor running this aggregator; direct pings are
    /// recorded under it.
    pub fn new(anchor_ids: [AnchorId; 3], local_anchor: AnchorId) -> Result<Self, ConfigError> {
        let [a, b, c] = &anchor_ids;
        if a == b || b == c || a == c {
            return Err(ConfigError::AnchorConflict {
                reason: "anchor ids must be distinct".to_string(),
            });
        }
        if !anchor_ids.contains(&local_anchor) {
            return Err(ConfigError::AnchorConflict {
                reason: format!(
                    "local anchor {} is not one of the configured anchors",
                    local_anchor
                ),
            });
        }

        Ok(Self {
            anchor_ids,
            local_anchor,
            parser: MessageParser::new(),
            readings: HashMap::with_capacity(3),
            device: None,
            last_activity: None,
        })
    }

    pub fn from_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        Self::new(config.anchor_ids()?, config.local_anchor.clone())
    }

    pub fn anchor_ids(&self) -> &[AnchorId; 3] {
        &self.anchor_ids
    }

    pub fn local_anchor(&self) -> &AnchorId {
        &self.local_anchor
    }

    /// Parse one received message and fold it into the current cycle.
    ///
    /// `rssi_dbm` is the signal strength the local radio measured for this
    /// message; it is only used for direct pings; relayed reports carry their
    /// own value. Errors leave the cycle untouched.
    pub fn ingest(
        &mut self,
        message: &str,
        rssi_dbm: i32,
        received_at: Instant,
    ) -> Result<IngestOutcome, IngestError> {
        let parsed = match self.parser.parse(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(payload = %message.trim(), error = %e, "dropping malformed message");
                return Err(e.into());
            }
        };

        let (anchor_id, rssi_dbm, device) = match parsed {
            RadioMessage::Ping { device_id } => (
                self.local_anchor.clone(),
                rssi_dbm,
                Some(DeviceTag { device_id, sos: false }),
            ),
            RadioMessage::Sos { device_id } => (
                self.local_anchor.clone(),
                rssi_dbm,
                Some(DeviceTag { device_id, sos: true }),
            ),
            RadioMessage::Report { anchor_id, rssi_dbm } => (anchor_id, rssi_dbm, None),
            RadioMessage::Unrecognized => {
                debug!(payload = %message.trim(), "ignoring unrecognized message");
                return Ok(IngestOutcome::Ignored);
            }
        };

        if !self.anchor_ids.contains(&anchor_id) {
            warn!(anchor = %anchor_id, rssi_dbm, "dropping report from unconfigured anchor");
            return Err(IngestError::UnknownAnchor { anchor_id });
        }

        if let Some(device) = device {
            if device.sos {
                warn!(device = %device.device_id, "SOS signal received");
            }
            self.device = Some(device);
        }

        debug!(anchor = %anchor_id, rssi_dbm, "recorded reading");
        self.readings.insert(
            anchor_id.clone(),
            SignalReading {
                anchor_id: anchor_id.clone(),
                rssi_dbm,
                received_at,
            },
        );
        self.last_activity = Some(received_at);

        Ok(IngestOutcome::Recorded { anchor_id })
    }

    pub fn state(&self) -> AggregatorState {
        if self.readings.is_empty() {
            AggregatorState::Empty
        } else if self.is_complete() {
            AggregatorState::Complete
        } else {
            AggregatorState::Partial
        }
    }

    /// Whether every configured anchor has reported this cycle
    pub fn is_complete(&self) -> bool {
        self.anchor_ids.iter().all(|id| self.readings.contains_key(id))
    }

    /// Number of distinct anchors heard this cycle
    pub fn reading_count(&self) -> usize {
        self.readings.len()
    }

    pub fn reading(&self, anchor_id: &AnchorId) -> Option<&SignalReading> {
        self.readings.get(anchor_id)
    }

    pub fn device(&self) -> Option<&DeviceTag> {
        self.device.as_ref()
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Take the completed reading set and start a new cycle.
    ///
    /// Returns `None` and leaves state untouched if the cycle is not complete.
    pub fn drain(&mut self) -> Option<CompletedCycle> {
        if !self.is_complete() {
            return None;
        }

        let mut readings = std::mem::take(&mut self.readings);
        let device = self.device.take();
        self.last_activity = None;

        let [a, b, c] = &self.anchor_ids;
        let readings = [readings.remove(a)?, readings.remove(b)?, readings.remove(c)?];

        Some(CompletedCycle { readings, device })
    }

    /// Discard a partial cycle that has been idle for longer than `timeout`.
    ///
    /// Returns the number of discarded readings. Empty and complete cycles
    /// are never expired.
    pub fn check_timeout(&mut self, now: Instant, timeout: Duration) -> Option<usize> {
        if self.state() != AggregatorState::Partial {
            return None;
        }

        let last_activity = self.last_activity?;
        if now.saturating_duration_since(last_activity) <= timeout {
            return None;
        }

        let discarded = self.readings.len();
        let heard: Vec<&str> = self.readings.keys().map(AnchorId::as_str).collect();
        warn!(
            ?heard,
            timeout_ms = timeout.as_millis() as u64,
            "cycle timed out with partial readings, discarding"
        );
        self.reset();
        Some(discarded)
    }

    /// Drop all readings and device identity
    pub fn reset(&mut self) {
        self.readings.clear();
        self.device = None;
        self.last_activity = None;
    }
}

/// Aggregator shared between a receive thread and a timeout sweeper
///
/// Every method holds the lock for the whole check-and-act sequence, so a
/// report cannot slip in between a completeness check and the drain, or
/// between a timeout check and the reset.
#[derive(Debug, Clone)]
pub struct SharedAggregator {
    inner: Arc<Mutex<ReadingAggregator>>,
}

impl SharedAggregator {
    pub fn new(aggregator: ReadingAggregator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    // A panic while holding the lock cannot leave the aggregator half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, ReadingAggregator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ingest(
        &self,
        message: &str,
        rssi_dbm: i32,
        received_at: Instant,
    ) -> Result<IngestOutcome, IngestError> {
        self.lock().ingest(message, rssi_dbm, received_at)
    }

    /// Drain the cycle if, and only if, it is complete
    pub fn try_drain(&self) -> Option<CompletedCycle> {
        self.lock().drain()
    }

    /// Expire a stale partial cycle
    pub fn expire_stale(&self, now: Instant, timeout: Duration) -> Option<usize> {
        self.lock().check_timeout(now, timeout)
    }

    pub fn state(&self) -> AggregatorState {
        self.lock().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> [AnchorId; 3] {
        [AnchorId::new("MASTER"), AnchorId::new("ANCHOR_2"), AnchorId::new("ANCHOR_3")]
    }

    fn aggregator() -> ReadingAggregator {
        ReadingAggregator::new(ids(), AnchorId::new("MASTER")).unwrap()
    }

    #[test]
    fn test_rejects_bad_anchor_sets() {
        let dup = [AnchorId::new("A"), AnchorId::new("A"), AnchorId::new("B")];
        assert!(ReadingAggregator::new(dup, AnchorId::new("A")).is_err());
        assert!(ReadingAggregator::new(ids(), AnchorId::new("ANCHOR_9")).is_err());
    }

    #[test]
    fn test_completes_in_any_order() {
        let t0 = Instant::now();
        let orders = [
            ["PING:DEV001", "REPORT:ANCHOR_2:-70", "REPORT:ANCHOR_3:-80"],
            ["REPORT:ANCHOR_3:-80", "PING:DEV001", "REPORT:ANCHOR_2:-70"],
            ["REPORT:ANCHOR_2:-70", "REPORT:ANCHOR_3:-80", "PING:DEV001"],
        ];

        for order in orders {
            let mut agg = aggregator();
            assert_eq!(agg.state(), AggregatorState::Empty);
            for (i, message) in order.iter().enumerate() {
                agg.ingest(message, -60, t0).unwrap();
                let expected = if i < 2 { AggregatorState::Partial } else { AggregatorState::Complete };
                assert_eq!(agg.state(), expected);
            }

            let cycle = agg.drain().unwrap();
            let ids: Vec<&str> = cycle.readings.iter().map(|r| r.anchor_id.as_str()).collect();
            assert_eq!(ids, ["MASTER", "ANCHOR_2", "ANCHOR_3"]);
            let rssi: Vec<i32> = cycle.readings.iter().map(|r| r.rssi_dbm).collect();
            assert_eq!(rssi, [-60, -70, -80]);
            assert_eq!(cycle.device, Some(DeviceTag { device_id: "DEV001".into(), sos: false }));

            assert_eq!(agg.state(), AggregatorState::Empty);
            assert!(agg.drain().is_none());
        }
    }

    #[test]
    fn test_drain_requires_completion() {
        let mut agg = aggregator();
        agg.ingest("PING:DEV001", -60, Instant::now()).unwrap();
        assert!(agg.drain().is_none());
        assert_eq!(agg.reading_count(), 1);
        assert!(agg.device().is_some());
    }

    #[test]
    fn test_last_writer_wins() {
        let t0 = Instant::now();
        let mut agg = aggregator();
        agg.ingest("REPORT:ANCHOR_2:-70", 0, t0).unwrap();
        agg.ingest("REPORT:ANCHOR_2:-55", 0, t0).unwrap();
        assert_eq!(agg.reading_count(), 1);
        assert_eq!(agg.reading(&AnchorId::new("ANCHOR_2")).unwrap().rssi_dbm, -55);
    }

    #[test]
    fn test_newer_direct_signal_replaces_device() {
        let t0 = Instant::now();
        let mut agg = aggregator();
        agg.ingest("PING:DEV001", -60, t0).unwrap();
        agg.ingest("SOS:DEV002", -58, t0).unwrap();
        assert_eq!(agg.device(), Some(&DeviceTag { device_id: "DEV002".into(), sos: true }));
        assert_eq!(agg.reading(&AnchorId::new("MASTER")).unwrap().rssi_dbm, -58);
    }

    #[test]
    fn test_timeout_discards_partial_cycle() {
        let t0 = Instant::now();
        let timeout = Duration::from_secs(10);
        let mut agg = aggregator();
        agg.ingest("PING:DEV001", -60, t0).unwrap();
        agg.ingest("REPORT:ANCHOR_2:-70", 0, t0 + Duration::from_secs(2)).unwrap();

        // Measured from the last activity, not the first reading
        assert_eq!(agg.check_timeout(t0 + Duration::from_secs(11), timeout), None);
        assert_eq!(agg.check_timeout(t0 + Duration::from_secs(12), timeout), None);
        assert_eq!(agg.state(), AggregatorState::Partial);

        assert_eq!(agg.check_timeout(t0 + Duration::from_millis(12_001), timeout), Some(2));
        assert_eq!(agg.state(), AggregatorState::Empty);
        assert!(agg.device().is_none());
        assert!(agg.reading(&AnchorId::new("MASTER")).is_none());
    }

    #[test]
    fn test_timeout_ignores_empty_and_complete() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(60);
        let timeout = Duration::from_secs(10);

        let mut agg = aggregator();
        assert_eq!(agg.check_timeout(later, timeout), None);

        agg.ingest("PING:DEV001", -60, t0).unwrap();
        agg.ingest("REPORT:ANCHOR_2:-70", 0, t0).unwrap();
        agg.ingest("REPORT:ANCHOR_3:-80", 0, t0).unwrap();
        assert_eq!(agg.check_timeout(later, timeout), None);
        assert!(agg.drain().is_some());
    }

    #[test]
    fn test_malformed_reports_leave_state_unchanged() {
        let t0 = Instant::now();
        let mut agg = aggregator();
        agg.ingest("PING:DEV001", -60, t0).unwrap();
        let before = agg.last_activity();

        let later = t0 + Duration::from_secs(5);
        assert!(matches!(
            agg.ingest("REPORT:ANCHOR_2", -40, later),
            Err(IngestError::Malformed(_))
        ));
        assert!(matches!(
            agg.ingest("REPORT:ANCHOR_2:notanumber", -40, later),
            Err(IngestError::Malformed(_))
        ));

        assert_eq!(agg.reading_count(), 1);
        assert!(agg.reading(&AnchorId::new("ANCHOR_2")).is_none());
        assert_eq!(agg.last_activity(), before);
    }

    #[test]
    fn test_unknown_anchor_dropped() {
        let mut agg = aggregator();
        let result = agg.ingest("REPORT:ANCHOR_7:-70", 0, Instant::now());
        assert_eq!(result, Err(IngestError::UnknownAnchor { anchor_id: AnchorId::new("ANCHOR_7") }));
        assert_eq!(agg.state(), AggregatorState::Empty);
        assert!(agg.last_activity().is_none());
    }

    #[test]
    fn test_unrecognized_ignored() {
        let mut agg = aggregator();
        assert_eq!(agg.ingest("TOURIST:PING", -50, Instant::now()), Ok(IngestOutcome::Ignored));
        assert_eq!(agg.state(), AggregatorState::Empty);
        assert!(agg.last_activity().is_none());
    }

    #[test]
    fn test_relay_local_direct_ping() {
        // A relay-hosted aggregator records direct pings under its own id
        let mut agg = ReadingAggregator::new(ids(), AnchorId::new("ANCHOR_2")).unwrap();
        let outcome = agg.ingest("PING:DEV001", -66, Instant::now()).unwrap();
        assert_eq!(outcome, IngestOutcome::Recorded { anchor_id: AnchorId::new("ANCHOR_2") });
    }

    #[test]
    fn test_shared_aggregator_across_threads() {
        let shared = SharedAggregator::new(aggregator());
        let t0 = Instant::now();

        let handles: Vec<_> = ["PING:DEV001", "REPORT:ANCHOR_2:-70", "REPORT:ANCHOR_3:-80"]
            .into_iter()
            .map(|message| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.ingest(message, -60, t0).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.state(), AggregatorState::Complete);
        assert!(shared.expire_stale(t0 + Duration::from_secs(60), Duration::from_secs(10)).is_none());
        assert!(shared.try_drain().is_some());
        assert!(shared.try_drain().is_none());
        assert_eq!(shared.state(), AggregatorState::Empty);
    }
}
