//! Events, failures and counters produced by a positioning session

use crate::core::PositionFix;
use std::fmt;
use thiserror::Error;

/// Why a completed cycle produced no position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CycleFailure {
    #[error("anchor geometry is collinear or coincident")]
    CollinearAnchors,
    #[error("only {usable} anchors have known positions")]
    InsufficientAnchors { usable: usize },
    #[error("cycle completed without a direct ping identifying the device")]
    MissingDevice,
}

/// Outcome of feeding the session a packet or a clock tick
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Located(PositionFix),
    CycleFailed(CycleFailure),
    /// A partial cycle went stale and its readings were dropped
    CycleExpired { discarded: usize },
}

/// Failure to hand a fix to its consumer
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to encode location payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write location payload: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink rejected position: {reason}")]
    Rejected { reason: String },
}

/// Running counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Packets handed to the session
    pub packets: u64,
    /// Readings stored in a cycle
    pub readings: u64,
    /// Malformed or unknown-anchor messages
    pub rejected: u64,
    pub fixes: u64,
    pub failures: u64,
    pub expirations: u64,
    pub deliveries: u64,
    pub delivery_errors: u64,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets={} readings={} rejected={} fixes={} failures={} expired={} \
             delivered={} delivery_errors={}",
            self.packets,
            self.readings,
            self.rejected,
            self.fixes,
            self.failures,
            self.expirations,
            self.deliveries,
            self.delivery_errors
        )
    }
}
