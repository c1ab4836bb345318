//! Deployment configuration: anchor table, calibration and timing
//!
//! Loaded once at startup from JSON and then only read. Missing sections fall
//! back to the stock three-node layout.

use crate::algorithms::trilateration::Trilaterator;
use crate::core::{
    AnchorId, Point2, DEFAULT_ANCHOR_IDS, DEFAULT_CYCLE_TIMEOUT_MS, DEFAULT_PATH_LOSS_EXPONENT,
    DEFAULT_PING_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REPORT_DELAY_MS,
    DEFAULT_RSSI_AT_1M, DEFAULT_SERIAL_BAUD_RATE, DEFAULT_SERIAL_READ_TIMEOUT_MS,
    DEFAULT_STATS_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid parameter value
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Anchor table does not describe exactly three distinct anchors
    #[error("anchor configuration error: {reason}")]
    AnchorConflict { reason: String },
    /// Anchor in the canonical order has no position
    #[error("anchor {anchor_id} has no configured position")]
    MissingPosition { anchor_id: AnchorId },
    /// Anchor layout cannot be trilaterated
    #[error("anchor geometry rejected: {reason}")]
    GeometryValidation { reason: String },
    /// Configuration file I/O error
    #[error("failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error
    #[error("malformed configuration: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Path-loss calibration constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Measured RSSI at one meter (dBm)
    pub rssi_at_1m: i32,
    /// Path-loss exponent N
    pub path_loss_exponent: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            rssi_at_1m: DEFAULT_RSSI_AT_1M,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

/// Relay node behaviour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base report delay, multiplied by the relay's slot
    pub report_delay_ms: u64,
    /// Median window over heard pings; 1 forwards every sample unchanged
    pub smoothing_window: usize,
    /// Sleep between radio polls
    pub poll_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            report_delay_ms: DEFAULT_REPORT_DELAY_MS,
            smoothing_window: 1,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Beacon (tourist device) behaviour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub ping_interval_ms: u64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
        }
    }
}

/// Gateway loop timing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Sleep between radio polls
    pub poll_interval_ms: u64,
    /// Interval between statistics log lines
    pub stats_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
        }
    }
}

/// Serial line settings for the radio module
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Upper bound on a blocking read; an idle channel yields no packet
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_SERIAL_BAUD_RATE,
            read_timeout_ms: DEFAULT_SERIAL_READ_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// System-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Anchor positions in the local frame (meters)
    pub anchors: BTreeMap<AnchorId, Point2>,
    /// Canonical anchor order used for trilateration
    pub anchor_order: Vec<AnchorId>,
    /// Anchor that hears the beacon directly and runs the session
    pub local_anchor: AnchorId,
    pub calibration: CalibrationConfig,
    /// Partial cycles are discarded after this much inactivity
    pub cycle_timeout_ms: u64,
    pub relay: RelayConfig,
    pub beacon: BeaconConfig,
    pub gateway: GatewayConfig,
    pub serial: SerialConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let anchor_order: Vec<AnchorId> =
            DEFAULT_ANCHOR_IDS.iter().map(|id| AnchorId::new(id)).collect();
        let positions = [Point2::new(0.0, 0.0), Point2::new(100.0, 0.0), Point2::new(50.0, 86.6)];

        Self {
            anchors: anchor_order.iter().cloned().zip(positions).collect(),
            local_anchor: anchor_order[0].clone(),
            anchor_order,
            calibration: CalibrationConfig::default(),
            cycle_timeout_ms: DEFAULT_CYCLE_TIMEOUT_MS,
            relay: RelayConfig::default(),
            beacon: BeaconConfig::default(),
            gateway: GatewayConfig::default(),
            serial: SerialConfig::default(),
        }
    }
}

/// Configuration validation result
#[derive(Debug)]
pub struct ValidationResult {
    /// Whether configuration is valid
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl SystemConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path)?;
        let config = Self::from_json_str(&content)?;
        debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = serde_json::from_str(json)?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate and log warnings, returning the first error if any
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let validation = self.validate();
        for warning in &validation.warnings {
            warn!("{}", warning);
        }
        match validation.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let distinct: BTreeSet<&AnchorId> = self.anchor_order.iter().collect();
        if self.anchor_order.len() != 3 || distinct.len() != 3 {
            errors.push(ConfigError::AnchorConflict {
                reason: format!(
                    "anchor_order must list exactly three distinct anchors, got {:?}",
                    self.anchor_order.iter().map(AnchorId::as_str).collect::<Vec<_>>()
                ),
            });
        }

        if !self.anchor_order.contains(&self.local_anchor) {
            errors.push(ConfigError::AnchorConflict {
                reason: format!("local anchor {} is not in anchor_order", self.local_anchor),
            });
        }

        for id in &self.anchor_order {
            match self.anchors.get(id) {
                None => errors.push(ConfigError::MissingPosition { anchor_id: id.clone() }),
                Some(position) if !position.is_finite() => {
                    errors.push(ConfigError::InvalidParameter {
                        parameter: format!("anchors.{}", id),
                        value: format!("({}, {})", position.x, position.y),
                        reason: "coordinates must be finite".to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        for id in self.anchors.keys() {
            if !self.anchor_order.contains(id) {
                warnings.push(format!("anchor {} has a position but is not in anchor_order", id));
            }
        }

        if errors.is_empty() {
            if let Some(positions) = self.ordered_positions() {
                if !Trilaterator::default().is_solvable_geometry(&positions) {
                    errors.push(ConfigError::GeometryValidation {
                        reason: "anchors are collinear or coincident".to_string(),
                    });
                } else if min_spacing(&positions) < 1.0 {
                    warnings.push(
                        "some anchors are less than 1 m apart, accuracy will suffer".to_string(),
                    );
                }
            }
        }

        let n = self.calibration.path_loss_exponent;
        if !n.is_finite() || n <= 0.0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "calibration.path_loss_exponent".to_string(),
                value: n.to_string(),
                reason: "must be finite and greater than zero".to_string(),
            });
        } else if !(1.5..=6.0).contains(&n) {
            warnings.push(format!(
                "path-loss exponent {} is outside the plausible 1.5-6.0 range",
                n
            ));
        }

        if self.calibration.rssi_at_1m > -10 {
            warnings.push(format!(
                "rssi_at_1m {} dBm is stronger than the -10 dBm clamp",
                self.calibration.rssi_at_1m
            ));
        }

        if self.cycle_timeout_ms == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "cycle_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        } else if self.cycle_timeout_ms <= self.relay.report_delay_ms.saturating_mul(2) {
            warnings.push(
                "cycle timeout is shorter than the slowest relay's report delay".to_string(),
            );
        }

        if self.relay.smoothing_window == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "relay.smoothing_window".to_string(),
                value: "0".to_string(),
                reason: "window must hold at least one sample".to_string(),
            });
        }

        if self.relay.poll_interval_ms == 0 || self.gateway.poll_interval_ms == 0 {
            warnings.push("a poll interval of 0 ms busy-loops on the radio".to_string());
        }

        if self.serial.baud_rate == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "serial.baud_rate".to_string(),
                value: "0".to_string(),
                reason: "baud rate must be positive".to_string(),
            });
        }

        if self.serial.read_timeout_ms == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "serial.read_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "read timeout must be positive".to_string(),
            });
        } else if self.serial.read_timeout_ms >= self.cycle_timeout_ms {
            warnings.push("serial read timeout is not shorter than the cycle timeout".to_string());
        }

        if self.beacon.ping_interval_ms == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "beacon.ping_interval_ms".to_string(),
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Anchor positions in canonical order, if all three are configured
    pub fn ordered_positions(&self) -> Option<[Point2; 3]> {
        if self.anchor_order.len() != 3 {
            return None;
        }
        let mut positions = [Point2::new(0.0, 0.0); 3];
        for (slot, id) in self.anchor_order.iter().enumerate() {
            positions[slot] = *self.anchors.get(id)?;
        }
        Some(positions)
    }

    /// Canonical anchor order as a fixed array
    pub fn anchor_ids(&self) -> Result<[AnchorId; 3], ConfigError> {
        match self.anchor_order.as_slice() {
            [a, b, c] => Ok([a.clone(), b.clone(), c.clone()]),
            other => Err(ConfigError::AnchorConflict {
                reason: format!("expected three anchors, got {}", other.len()),
            }),
        }
    }

    /// Position of the given anchor in the canonical order (0-based)
    pub fn slot_of(&self, anchor_id: &AnchorId) -> Option<usize> {
        self.anchor_order.iter().position(|id| id == anchor_id)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

fn min_spacing(positions: &[Point2; 3]) -> f64 {
    let mut min_distance = f64::INFINITY;
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let dx = positions[i].x - positions[j].x;
            let dy = positions[i].y - positions[j].y;
            min_distance = min_distance.min((dx * dx + dy * dy).sqrt());
        }
    }
    min_distance
}
