//! Gateway (master anchor) loop
//!
//! One cooperative loop: poll the radio, feed the session, deliver fixes,
//! sweep for stale cycles and periodically log statistics.

use crate::api::delivery::PositionSink;
use crate::api::pause;
use crate::api::session::PositioningSession;
use crate::api::types::{SessionEvent, SessionStats};
use crate::hardware::{CommError, RadioTransceiver, RecoveryStrategy};
use crate::utils::config::GatewayConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct GatewayNode<R, S> {
    radio: R,
    sink: S,
    session: PositioningSession,
    poll_interval: Duration,
    stats_interval: Duration,
    last_stats_log: Option<Instant>,
    radio_errors: u64,
    backoff: Option<Duration>,
}

impl<R: RadioTransceiver, S: PositionSink> GatewayNode<R, S> {
    pub fn new(radio: R, sink: S, session: PositioningSession, config: &GatewayConfig) -> Self {
        Self {
            radio,
            sink,
            session,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stats_interval: Duration::from_millis(config.stats_interval_ms),
            last_stats_log: None,
            radio_errors: 0,
            backoff: None,
        }
    }

    /// Run one loop iteration at time `now`, returning the events it produced
    pub fn step(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        // Sweep first so a stale cycle is gone before the next packet lands
        if let Some(event) = self.session.poll_timeout(now) {
            self.dispatch(&event);
            events.push(event);
        }

        match self.radio.receive() {
            Ok(Some(packet)) => {
                debug!(payload = %packet.message(), rssi_dbm = packet.rssi_dbm, "received packet");
                if let Some(event) = self.session.handle_packet(&packet) {
                    self.dispatch(&event);
                    events.push(event);
                }
            }
            Ok(None) => {}
            Err(e) => self.record_radio_error(e),
        }

        let stats_due = self
            .last_stats_log
            .map_or(true, |last| now.saturating_duration_since(last) >= self.stats_interval);
        if stats_due {
            if self.last_stats_log.is_some() {
                let status = self.radio.status();
                info!(
                    radio = %self.radio.name(),
                    healthy = status.is_healthy(),
                    radio_errors = self.radio_errors,
                    stats = %self.session.stats(),
                    "gateway statistics"
                );
            }
            self.last_stats_log = Some(now);
        }

        events
    }

    /// Loop until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            radio = %self.radio.name(),
            poll_ms = self.poll_interval.as_millis() as u64,
            timeout_ms = self.session.timeout().as_millis() as u64,
            "gateway started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            self.step(Instant::now());
            let wait = self.backoff.take().unwrap_or(self.poll_interval);
            if !pause(shutdown, wait) {
                break;
            }
        }

        info!(radio_errors = self.radio_errors, stats = %self.session.stats(), "gateway stopped");
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn radio_errors(&self) -> u64 {
        self.radio_errors
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn dispatch(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Located(fix) => match self.sink.deliver(fix) {
                Ok(()) => {
                    self.session.record_delivery(true);
                    debug!(device = %fix.device_id, "position delivered");
                }
                Err(e) => {
                    self.session.record_delivery(false);
                    error!(device = %fix.device_id, error = %e, "failed to deliver position");
                }
            },
            SessionEvent::CycleFailed(failure) => {
                debug!(%failure, "cycle dropped");
            }
            SessionEvent::CycleExpired { discarded } => {
                debug!(discarded, "partial cycle expired");
            }
        }
    }

    fn record_radio_error(&mut self, error: CommError) {
        self.radio_errors += 1;
        if !error.is_recoverable() {
            error!(radio = %self.radio.name(), error = %error, "radio receive failed");
            return;
        }

        if let RecoveryStrategy::RetryWithDelay { delay_ms } = error.recovery_strategy() {
            warn!(
                radio = %self.radio.name(),
                error = %error,
                delay_ms,
                "radio receive failed, backing off"
            );
            self.backoff = Some(Duration::from_millis(delay_ms as u64));
        } else {
            warn!(radio = %self.radio.name(), error = %error, "radio receive failed");
        }
    }
}
