//! RSSI to distance conversion using the log-distance path-loss model
//!
//! `distance = 10 ^ ((RSSI_AT_1M - rssi) / (10 * N))`

use crate::core::types::round2;
use crate::core::{DistanceEstimate, SignalReading, MAX_ESTIMATED_DISTANCE_M, RSSI_CEILING_DBM};
use crate::utils::config::{CalibrationConfig, ConfigError};

/// Calibrated path-loss model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimator {
    /// Signal strength expected at one meter (dBm)
    rssi_at_1m: i32,
    /// Environmental path-loss exponent
    path_loss_exponent: f64,
}

impl DistanceEstimator {
    pub fn new(rssi_at_1m: i32, path_loss_exponent: f64) -> Result<Self, ConfigError> {
        if !path_loss_exponent.is_finite() || path_loss_exponent <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "path_loss_exponent".to_string(),
                value: path_loss_exponent.to_string(),
                reason: "must be finite and greater than zero".to_string(),
            });
        }

        Ok(Self {
            rssi_at_1m,
            path_loss_exponent,
        })
    }

    pub fn from_calibration(calibration: &CalibrationConfig) -> Result<Self, ConfigError> {
        Self::new(calibration.rssi_at_1m, calibration.path_loss_exponent)
    }

    pub fn rssi_at_1m(&self) -> i32 {
        self.rssi_at_1m
    }

    pub fn path_loss_exponent(&self) -> f64 {
        self.path_loss_exponent
    }

    /// Estimate the distance in meters for a single RSSI sample.
    ///
    /// Readings stronger than -10 dBm are clamped to -10 dBm. The result is
    /// rounded to centimeters and saturates at [`MAX_ESTIMATED_DISTANCE_M`].
    pub fn estimate(&self, rssi_dbm: i32) -> f64 {
        let rssi = rssi_dbm.min(RSSI_CEILING_DBM);

        // i32 difference can exceed i32 range, widen first
        let exponent =
            (self.rssi_at_1m as f64 - rssi as f64) / (10.0 * self.path_loss_exponent);
        let distance = 10f64.powf(exponent);

        if !distance.is_finite() || distance > MAX_ESTIMATED_DISTANCE_M {
            return MAX_ESTIMATED_DISTANCE_M;
        }

        round2(distance)
    }

    pub fn estimate_reading(&self, reading: &SignalReading) -> DistanceEstimate {
        DistanceEstimate {
            anchor_id: reading.anchor_id.clone(),
            distance_m: self.estimate(reading.rssi_dbm),
        }
    }
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self {
            rssi_at_1m: crate::core::DEFAULT_RSSI_AT_1M,
            path_loss_exponent: crate::core::DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}
