//! Delivery of located positions to their consumer

use crate::api::types::DeliveryError;
use crate::core::PositionFix;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// JSON body sent for every located beacon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub device_id: String,
    pub x: f64,
    pub y: f64,
    pub rssi: i32,
    pub sos_flag: bool,
    pub anchors: Vec<String>,
}

impl From<&PositionFix> for LocationPayload {
    fn from(fix: &PositionFix) -> Self {
        Self {
            device_id: fix.device_id.clone(),
            x: fix.x_m,
            y: fix.y_m,
            rssi: fix.average_rssi,
            sos_flag: fix.sos,
            anchors: fix
                .contributing_anchors
                .iter()
                .map(|id| id.as_str().to_string())
                .collect(),
        }
    }
}

/// Consumer of position fixes
pub trait PositionSink {
    fn deliver(&mut self, fix: &PositionFix) -> Result<(), DeliveryError>;
}

impl<T: PositionSink + ?Sized> PositionSink for Box<T> {
    fn deliver(&mut self, fix: &PositionFix) -> Result<(), DeliveryError> {
        (**self).deliver(fix)
    }
}

/// Writes one [`LocationPayload`] JSON object per line
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PositionSink for JsonLinesSink<W> {
    fn deliver(&mut self, fix: &PositionFix) -> Result<(), DeliveryError> {
        serde_json::to_writer(&mut self.writer, &LocationPayload::from(fix))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps delivered fixes in memory; can be told to refuse them
#[derive(Debug, Default)]
pub struct MemorySink {
    fixes: Vec<PositionFix>,
    reject_reason: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that fails every delivery with `reason`
    pub fn rejecting(reason: &str) -> Self {
        Self {
            fixes: Vec::new(),
            reject_reason: Some(reason.to_string()),
        }
    }

    pub fn fixes(&self) -> &[PositionFix] {
        &self.fixes
    }
}

impl PositionSink for MemorySink {
    fn deliver(&mut self, fix: &PositionFix) -> Result<(), DeliveryError> {
        if let Some(reason) = &self.reject_reason {
            return Err(DeliveryError::Rejected {
                reason: reason.clone(),
            });
        }
        self.fixes.push(fix.clone());
        Ok(())
    }
}
