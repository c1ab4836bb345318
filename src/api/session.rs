//! Positioning session: aggregated readings in, located beacons out
//!
//! The session owns the cycle state. Each packet is parsed and folded into
//! the aggregator; when all three anchors have reported, the cycle is drained,
//! distances are estimated and the position is solved. A partial cycle that
//! goes quiet is expired by [`PositioningSession::poll_timeout`].

use crate::algorithms::{DistanceEstimator, RangeCircle, Trilaterator};
use crate::api::types::{CycleFailure, SessionEvent, SessionStats};
use crate::core::{AnchorId, Point2, PositionFix};
use crate::hardware::RadioPacket;
use crate::processing::{AggregatorState, CompletedCycle, IngestOutcome, ReadingAggregator};
use crate::utils::config::{ConfigError, SystemConfig};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct PositioningSession {
    aggregator: ReadingAggregator,
    estimator: DistanceEstimator,
    trilaterator: Trilaterator,
    positions: BTreeMap<AnchorId, Point2>,
    timeout: Duration,
    stats: SessionStats,
}

impl PositioningSession {
    /// Build a session from a validated configuration
    pub fn new(config: &SystemConfig) -> Result<Self, ConfigError> {
        config.ensure_valid()?;

        Ok(Self::from_parts(
            ReadingAggregator::from_config(config)?,
            DistanceEstimator::from_calibration(&config.calibration)?,
            config.anchors.clone(),
            config.cycle_timeout(),
        ))
    }

    /// Assemble a session without configuration checks.
    ///
    /// Anchors absent from `positions` still count toward cycle completion
    /// but cannot contribute to a fix.
    pub fn from_parts(
        aggregator: ReadingAggregator,
        estimator: DistanceEstimator,
        positions: BTreeMap<AnchorId, Point2>,
        timeout: Duration,
    ) -> Self {
        Self {
            aggregator,
            estimator,
            trilaterator: Trilaterator::default(),
            positions,
            timeout,
            stats: SessionStats::default(),
        }
    }

    /// Feed one received packet.
    ///
    /// A partial cycle that went stale before this packet arrived is expired
    /// first, and the packet starts a new cycle. Returns an event when the
    /// packet expired a cycle or completed one.
    pub fn handle_packet(&mut self, packet: &RadioPacket) -> Option<SessionEvent> {
        self.stats.packets += 1;

        let expired = self.poll_timeout(packet.received_at);

        let message = packet.message();
        match self.aggregator.ingest(&message, packet.rssi_dbm, packet.received_at) {
            Ok(IngestOutcome::Recorded { .. }) => self.stats.readings += 1,
            Ok(IngestOutcome::Ignored) => return expired,
            Err(_) => {
                self.stats.rejected += 1;
                return expired;
            }
        }

        // A fresh cycle holds one reading, so it cannot complete here
        if expired.is_some() {
            return expired;
        }

        let cycle = self.aggregator.drain()?;
        Some(self.finish_cycle(cycle))
    }

    /// Expire the current cycle if it has been partial for too long
    pub fn poll_timeout(&mut self, now: Instant) -> Option<SessionEvent> {
        let discarded = self.aggregator.check_timeout(now, self.timeout)?;
        self.stats.expirations += 1;
        Some(SessionEvent::CycleExpired { discarded })
    }

    /// Count the outcome of handing a fix to its consumer
    pub fn record_delivery(&mut self, delivered: bool) {
        if delivered {
            self.stats.deliveries += 1;
        } else {
            self.stats.delivery_errors += 1;
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn state(&self) -> AggregatorState {
        self.aggregator.state()
    }

    /// Number of anchors heard in the current cycle
    pub fn reading_count(&self) -> usize {
        self.aggregator.reading_count()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn finish_cycle(&mut self, cycle: CompletedCycle) -> SessionEvent {
        match self.locate(cycle) {
            Ok(fix) => {
                self.stats.fixes += 1;
                info!(
                    device = %fix.device_id,
                    x = fix.x_m,
                    y = fix.y_m,
                    rssi = fix.average_rssi,
                    sos = fix.sos,
                    "beacon located"
                );
                SessionEvent::Located(fix)
            }
            Err(failure) => {
                self.stats.failures += 1;
                warn!(%failure, "cycle produced no position");
                SessionEvent::CycleFailed(failure)
            }
        }
    }

    fn locate(&self, cycle: CompletedCycle) -> Result<PositionFix, CycleFailure> {
        let device = cycle.device.ok_or(CycleFailure::MissingDevice)?;

        let circles: Vec<RangeCircle> = cycle
            .readings
            .iter()
            .filter_map(|reading| {
                let center = *self.positions.get(&reading.anchor_id)?;
                let estimate = self.estimator.estimate_reading(reading);
                debug!(
                    anchor = %estimate.anchor_id,
                    rssi_dbm = reading.rssi_dbm,
                    distance_m = estimate.distance_m,
                    "estimated range"
                );
                Some(RangeCircle {
                    center,
                    radius: estimate.distance_m,
                })
            })
            .collect();
        let circles: [RangeCircle; 3] = circles
            .try_into()
            .map_err(|usable: Vec<RangeCircle>| CycleFailure::InsufficientAnchors {
                usable: usable.len(),
            })?;

        let point = self
            .trilaterator
            .solve(&circles)
            .ok_or(CycleFailure::CollinearAnchors)?;

        let total: i64 = cycle.readings.iter().map(|r| r.rssi_dbm as i64).sum();
        let average_rssi = (total as f64 / cycle.readings.len() as f64).round() as i32;

        Ok(PositionFix {
            x_m: point.x,
            y_m: point.y,
            device_id: device.device_id,
            sos: device.sos,
            contributing_anchors: cycle.readings.iter().map(|r| r.anchor_id.clone()).collect(),
            average_rssi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PositioningSession {
        PositioningSession::new(&SystemConfig::default()).unwrap()
    }

    fn packet(message: &str, rssi_dbm: i32, at: Instant) -> RadioPacket {
        RadioPacket::text(message, rssi_dbm).with_received_at(at)
    }

    #[test]
    fn test_three_readings_produce_one_fix() {
        let t0 = Instant::now();
        let mut session = session();

        assert!(session.handle_packet(&packet("PING:dev001", -60, t0)).is_none());
        assert!(session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, t0)).is_none());
        let event = session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, t0)).unwrap();

        let SessionEvent::Located(fix) = event else {
            panic!("expected a fix, got {:?}", event);
        };
        assert_eq!(fix.device_id, "DEV001");
        assert!(!fix.sos);
        assert_eq!(fix.average_rssi, -70);
        assert_eq!(fix.contributing_anchors.len(), 3);
        assert!(fix.x_m.is_finite() && fix.y_m.is_finite());

        assert_eq!(session.state(), AggregatorState::Empty);
        let stats = session.stats();
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.readings, 3);
        assert_eq!(stats.fixes, 1);
    }

    #[test]
    fn test_sos_flag_carried_to_fix() {
        let t0 = Instant::now();
        let mut session = session();
        session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, t0));
        session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, t0));
        let event = session.handle_packet(&packet("SOS:DEV007", -61, t0));

        match event {
            Some(SessionEvent::Located(fix)) => {
                assert!(fix.sos);
                assert_eq!(fix.device_id, "DEV007");
                // mean of -61, -70, -80 is -70.33
                assert_eq!(fix.average_rssi, -70);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_mean_rssi_rounds_to_nearest() {
        let t0 = Instant::now();
        let mut session = session();
        session.handle_packet(&packet("PING:DEV001", -60, t0));
        session.handle_packet(&packet("REPORT:ANCHOR_2:-72", -35, t0));
        let event = session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, t0));
        // mean of -60, -72, -80 is -70.67
        assert!(matches!(event, Some(SessionEvent::Located(ref fix)) if fix.average_rssi == -71));
    }

    #[test]
    fn test_relayed_only_cycle_is_missing_device() {
        let t0 = Instant::now();
        let mut session = session();
        session.handle_packet(&packet("REPORT:MASTER:-60", -35, t0));
        session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, t0));
        let event = session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, t0));

        assert_eq!(event, Some(SessionEvent::CycleFailed(CycleFailure::MissingDevice)));
        assert_eq!(session.state(), AggregatorState::Empty);
        assert_eq!(session.stats().failures, 1);
    }

    #[test]
    fn test_anchor_without_position_is_excluded() {
        let config = SystemConfig::default();
        let mut positions = config.anchors.clone();
        positions.remove(&AnchorId::new("ANCHOR_3"));
        let mut session = PositioningSession::from_parts(
            ReadingAggregator::from_config(&config).unwrap(),
            DistanceEstimator::default(),
            positions,
            config.cycle_timeout(),
        );

        let t0 = Instant::now();
        session.handle_packet(&packet("PING:DEV001", -60, t0));
        session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, t0));
        let event = session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, t0));
        assert_eq!(
            event,
            Some(SessionEvent::CycleFailed(CycleFailure::InsufficientAnchors { usable: 2 }))
        );
    }

    #[test]
    fn test_collinear_positions_fail_cycle() {
        let config = SystemConfig::default();
        let positions: BTreeMap<AnchorId, Point2> = [
            ("MASTER", Point2::new(0.0, 0.0)),
            ("ANCHOR_2", Point2::new(50.0, 0.0)),
            ("ANCHOR_3", Point2::new(100.0, 0.0)),
        ]
        .into_iter()
        .map(|(id, p)| (AnchorId::new(id), p))
        .collect();
        let mut session = PositioningSession::from_parts(
            ReadingAggregator::from_config(&config).unwrap(),
            DistanceEstimator::default(),
            positions,
            config.cycle_timeout(),
        );

        let t0 = Instant::now();
        session.handle_packet(&packet("PING:DEV001", -60, t0));
        session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, t0));
        let event = session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, t0));
        assert_eq!(event, Some(SessionEvent::CycleFailed(CycleFailure::CollinearAnchors)));
        assert_eq!(session.state(), AggregatorState::Empty);
    }

    #[test]
    fn test_rejected_and_ignored_messages() {
        let t0 = Instant::now();
        let mut session = session();
        assert!(session.handle_packet(&packet("REPORT:ANCHOR_2:oops", -35, t0)).is_none());
        assert!(session.handle_packet(&packet("REPORT:ANCHOR_9:-70", -35, t0)).is_none());
        assert!(session.handle_packet(&packet("HELLO", -35, t0)).is_none());

        let stats = session.stats();
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.readings, 0);
        assert_eq!(session.state(), AggregatorState::Empty);
    }

    #[test]
    fn test_partial_cycle_expires() {
        let t0 = Instant::now();
        let mut session = session();
        session.handle_packet(&packet("PING:DEV001", -60, t0));
        session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, t0));

        assert!(session.poll_timeout(t0 + Duration::from_secs(5)).is_none());
        assert_eq!(
            session.poll_timeout(t0 + Duration::from_secs(11)),
            Some(SessionEvent::CycleExpired { discarded: 2 })
        );
        assert_eq!(session.state(), AggregatorState::Empty);
        assert_eq!(session.stats().expirations, 1);

        // A late third reading starts a fresh cycle instead of completing the old one
        let late = t0 + Duration::from_secs(12);
        assert!(session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, late)).is_none());
        assert_eq!(session.state(), AggregatorState::Partial);
    }

    #[test]
    fn test_late_report_expires_stale_cycle() {
        let t0 = Instant::now();
        let mut session = session();
        session.handle_packet(&packet("PING:DEV001", -60, t0));
        session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, t0));

        // No sweep in between; the late report itself must expire the cycle
        let late = t0 + Duration::from_secs(30);
        let event = session.handle_packet(&packet("REPORT:ANCHOR_3:-80", -35, late));

        assert_eq!(event, Some(SessionEvent::CycleExpired { discarded: 2 }));
        assert_eq!(session.state(), AggregatorState::Partial);
        assert_eq!(session.reading_count(), 1);
        assert_eq!(session.stats().fixes, 0);
        assert_eq!(session.stats().expirations, 1);
        assert_eq!(session.stats().readings, 3);

        // The late report is the first reading of the next cycle
        session.handle_packet(&packet("PING:DEV001", -60, late));
        let event = session.handle_packet(&packet("REPORT:ANCHOR_2:-70", -35, late));
        assert!(matches!(event, Some(SessionEvent::Located(_))));
    }

    #[test]
    fn test_late_malformed_message_still_expires() {
        let t0 = Instant::now();
        let mut session = session();
        session.handle_packet(&packet("PING:DEV001", -60, t0));

        let late = t0 + Duration::from_secs(30);
        let event = session.handle_packet(&packet("REPORT:ANCHOR_2", -35, late));
        assert_eq!(event, Some(SessionEvent::CycleExpired { discarded: 1 }));
        assert_eq!(session.state(), AggregatorState::Empty);
        assert_eq!(session.stats().rejected, 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = SystemConfig::default();
        config.calibration.path_loss_exponent = 0.0;
        assert!(PositioningSession::new(&config).is_err());
    }
}
