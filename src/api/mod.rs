//! Node roles built on the positioning core
//!
//! The gateway runs a [`PositioningSession`] over its radio and hands fixes to
//! a [`PositionSink`]. Relays and the beacon are thin loops that only transmit.

pub mod types;
pub mod session;
pub mod delivery;
pub mod gateway;
pub mod relay;
pub mod beacon;

pub use types::{CycleFailure, DeliveryError, SessionEvent, SessionStats};
pub use session::PositioningSession;
pub use delivery::{JsonLinesSink, LocationPayload, MemorySink, PositionSink};
pub use gateway::GatewayNode;
pub use relay::{RelayForwarder, RssiSmoother};
pub use beacon::{BeaconTransmitter, SosSource};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Sleep for `duration`, returning early once `shutdown` is set.
/// Returns `false` if shutdown was requested.
pub(crate) fn pause(shutdown: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_CHECK_INTERVAL));
    }
}
