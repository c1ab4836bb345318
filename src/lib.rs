//! RSSI beacon positioning
//!
//! Three fixed anchors hear a beacon's pings. The gateway anchor measures the
//! signal strength itself; the two relays forward theirs as `REPORT` messages.
//! Once all three readings of a cycle are in, signal strengths are converted
//! to distances with a log-distance path-loss model and the beacon is
//! trilaterated in the anchors' 2D frame.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod utils;
pub mod hardware;
pub mod api;

// Re-export commonly used types
pub use core::{AnchorId, DeviceTag, DistanceEstimate, Point2, PositionFix, SignalReading};
pub use algorithms::{DistanceEstimator, RangeCircle, Trilaterator};
pub use processing::{
    AggregatorState, CompletedCycle, IngestError, MessageParser, ParseError, RadioMessage,
    ReadingAggregator, SharedAggregator,
};
pub use hardware::{
    CommError, CommResult, MockRadio, RadioPacket, RadioTransceiver, SerialRadio, SimulatedRadio,
};
pub use api::{
    BeaconTransmitter, CycleFailure, DeliveryError, GatewayNode, JsonLinesSink, LocationPayload,
    MemorySink, PositionSink, PositioningSession, RelayForwarder, RssiSmoother, SessionEvent,
    SessionStats, SosSource,
};
pub use utils::config::{ConfigError, SystemConfig};
