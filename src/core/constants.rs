//! Calibration defaults and system parameters

/// Expected RSSI at one meter from an anchor (dBm)
pub const DEFAULT_RSSI_AT_1M: i32 = -40;

/// Path-loss exponent: 2.0 open air, 3.0 urban/trees, 4.0 indoor
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 3.0;

/// Readings stronger than this are treated as this value (dBm)
pub const RSSI_CEILING_DBM: i32 = -10;

/// Distance estimates saturate here so weak signals stay finite (meters)
pub const MAX_ESTIMATED_DISTANCE_M: f64 = 1.0e9;

/// Minimum sine between the two trilateration baselines
pub const COLLINEARITY_EPSILON: f64 = 1e-9;

/// Partial cycles older than this are discarded (milliseconds)
pub const DEFAULT_CYCLE_TIMEOUT_MS: u64 = 10_000;

/// Base relay report delay, multiplied by the relay's slot (milliseconds)
pub const DEFAULT_REPORT_DELAY_MS: u64 = 500;

/// Beacon transmit interval (milliseconds)
pub const DEFAULT_PING_INTERVAL_MS: u64 = 2_000;

/// Gateway loop sleep between radio polls (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Gateway statistics log interval (milliseconds)
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 60_000;

/// Anchor ids of the stock three-node deployment, in canonical order
pub const DEFAULT_ANCHOR_IDS: [&str; 3] = ["MASTER", "ANCHOR_2", "ANCHOR_3"];

/// UART speed of the LoRa module's serial interface
pub const DEFAULT_SERIAL_BAUD_RATE: u32 = 9_600;

/// Longest a serial read may block before reporting nothing pending (milliseconds)
pub const DEFAULT_SERIAL_READ_TIMEOUT_MS: u64 = 50;
