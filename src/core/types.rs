//! Core data types for the positioning system

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

/// Identifier of a fixed anchor node (e.g. `MASTER`, `ANCHOR_2`)
///
/// Ids are trimmed and uppercased on construction, so `"anchor_2 "` and
/// `"ANCHOR_2"` name the same anchor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AnchorId(String);

impl AnchorId {
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AnchorId {
    fn from(id: String) -> Self {
        Self::new(&id)
    }
}

impl From<&str> for AnchorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<AnchorId> for String {
    fn from(id: AnchorId) -> Self {
        id.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 2D point in the local anchor frame, meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One signal-strength observation attributed to an anchor
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReading {
    pub anchor_id: AnchorId,
    pub rssi_dbm: i32,
    pub received_at: Instant,
}

/// Distance derived from a single reading
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceEstimate {
    pub anchor_id: AnchorId,
    pub distance_m: f64,
}

/// Device identity learned from a direct ping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTag {
    pub device_id: String,
    pub sos: bool,
}

/// Located beacon, the output of one successful cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionFix {
    pub x_m: f64,
    pub y_m: f64,
    pub device_id: String,
    pub sos: bool,
    pub contributing_anchors: BTreeSet<AnchorId>,
    pub average_rssi: i32,
}

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
