//! Colon-delimited radio protocol
//!
//! ```text
//! PING:<device_id>
//! SOS:<device_id>
//! REPORT:<anchor_id>:<rssi_dbm>
//! ```

use crate::core::AnchorId;
use std::fmt;
use thiserror::Error;

const PING_KEYWORD: &str = "PING";
const SOS_KEYWORD: &str = "SOS";
const REPORT_KEYWORD: &str = "REPORT";

/// Radio text message exchanged between beacon, relays and gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioMessage {
    /// `PING:<device_id>` heard directly from the beacon
    Ping { device_id: String },
    /// `SOS:<device_id>` heard directly from the beacon
    Sos { device_id: String },
    /// `REPORT:<anchor_id>:<rssi>` relayed by another anchor
    Report { anchor_id: AnchorId, rssi_dbm: i32 },
    /// Anything else on the channel
    Unrecognized,
}

impl RadioMessage {
    /// Whether this message was transmitted by the beacon itself
    pub fn is_direct(&self) -> bool {
        matches!(self, RadioMessage::Ping { .. } | RadioMessage::Sos { .. })
    }

    /// Wire form of the message, `None` for unrecognized traffic
    pub fn to_wire(&self) -> Option<String> {
        match self {
            RadioMessage::Unrecognized => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for RadioMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioMessage::Ping { device_id } => write!(f, "{}:{}", PING_KEYWORD, device_id),
            RadioMessage::Sos { device_id } => write!(f, "{}:{}", SOS_KEYWORD, device_id),
            RadioMessage::Report { anchor_id, rssi_dbm } => {
                write!(f, "{}:{}:{}", REPORT_KEYWORD, anchor_id, rssi_dbm)
            }
            RadioMessage::Unrecognized => f.write_str("<unrecognized>"),
        }
    }
}

/// Errors that can occur during message parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{keyword} message needs {expected} fields, got {actual}")]
    FieldCount { keyword: &'static str, expected: usize, actual: usize },
    #[error("{keyword} message has an empty {field}")]
    EmptyField { keyword: &'static str, field: &'static str },
    #[error("invalid RSSI value {value:?}")]
    InvalidRssi { value: String },
}

/// Parser for the colon-delimited radio protocol
///
/// Keywords and identifiers are case-insensitive and normalized to uppercase.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageParser;

impl MessageParser {
    pub fn new() -> Self {
        Self
    }

    /// Classify one received message.
    ///
    /// Unknown keywords yield `Ok(RadioMessage::Unrecognized)`; a known keyword
    /// with a bad payload is a `ParseError`.
    pub fn parse(&self, text: &str) -> Result<RadioMessage, ParseError> {
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let fields: Vec<&str> = text.split(':').map(str::trim).collect();

        match fields[0].to_uppercase().as_str() {
            PING_KEYWORD => {
                let device_id = Self::device_id(PING_KEYWORD, &fields)?;
                Ok(RadioMessage::Ping { device_id })
            }
            SOS_KEYWORD => {
                let device_id = Self::device_id(SOS_KEYWORD, &fields)?;
                Ok(RadioMessage::Sos { device_id })
            }
            REPORT_KEYWORD => Self::parse_report(&fields),
            _ => Ok(RadioMessage::Unrecognized),
        }
    }

    fn device_id(keyword: &'static str, fields: &[&str]) -> Result<String, ParseError> {
        if fields.len() != 2 {
            return Err(ParseError::FieldCount {
                keyword,
                expected: 2,
                actual: fields.len(),
            });
        }
        if fields[1].is_empty() {
            return Err(ParseError::EmptyField {
                keyword,
                field: "device_id",
            });
        }
        Ok(fields[1].to_uppercase())
    }

    fn parse_report(fields: &[&str]) -> Result<RadioMessage, ParseError> {
        if fields.len() != 3 {
            return Err(ParseError::FieldCount {
                keyword: REPORT_KEYWORD,
                expected: 3,
                actual: fields.len(),
            });
        }
        if fields[1].is_empty() {
            return Err(ParseError::EmptyField {
                keyword: REPORT_KEYWORD,
                field: "anchor_id",
            });
        }

        let rssi_dbm = fields[2].parse::<i32>().map_err(|_| ParseError::InvalidRssi {
            value: fields[2].to_string(),
        })?;

        Ok(RadioMessage::Report {
            anchor_id: AnchorId::new(fields[1]),
            rssi_dbm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping_and_sos() {
        let parser = MessageParser::new();
        assert_eq!(
            parser.parse("PING:dev001").unwrap(),
            RadioMessage::Ping { device_id: "DEV001".to_string() }
        );
        assert_eq!(
            parser.parse("sos: DEV042 \r\n").unwrap(),
            RadioMessage::Sos { device_id: "DEV042".to_string() }
        );
    }

    #[test]
    fn test_parse_report() {
        let parser = MessageParser::new();
        assert_eq!(
            parser.parse("REPORT:anchor_2:-65").unwrap(),
            RadioMessage::Report { anchor_id: AnchorId::new("ANCHOR_2"), rssi_dbm: -65 }
        );
    }

    #[test]
    fn test_malformed_report() {
        let parser = MessageParser::new();
        assert_eq!(
            parser.parse("REPORT:ANCHOR_2"),
            Err(ParseError::FieldCount { keyword: "REPORT", expected: 3, actual: 2 })
        );
        assert_eq!(
            parser.parse("REPORT:ANCHOR_2:notanumber"),
            Err(ParseError::InvalidRssi { value: "notanumber".to_string() })
        );
        assert!(parser.parse("REPORT:ANCHOR_2:-65:extra").is_err());
        assert!(parser.parse("REPORT::-65").is_err());
        assert!(parser.parse("REPORT:ANCHOR_2:-65.5").is_err());
    }

    #[test]
    fn test_malformed_direct_signal() {
        let parser = MessageParser::new();
        assert!(parser.parse("PING").is_err());
        assert!(parser.parse("PING:").is_err());
        assert!(parser.parse("SOS:DEV001:extra").is_err());
    }

    #[test]
    fn test_unrecognized() {
        let parser = MessageParser::new();
        assert_eq!(parser.parse("TOURIST:PING").unwrap(), RadioMessage::Unrecognized);
        assert_eq!(parser.parse("").unwrap(), RadioMessage::Unrecognized);
        assert_eq!(parser.parse("hello world").unwrap(), RadioMessage::Unrecognized);
    }

    #[test]
    fn test_wire_format() {
        let report = RadioMessage::Report { anchor_id: AnchorId::new("anchor_3"), rssi_dbm: -71 };
        assert_eq!(report.to_wire().unwrap(), "REPORT:ANCHOR_3:-71");
        assert_eq!(RadioMessage::Sos { device_id: "DEV9".into() }.to_wire().unwrap(), "SOS:DEV9");
        assert!(RadioMessage::Unrecognized.to_wire().is_none());
        assert!(RadioMessage::Ping { device_id: "A".into() }.is_direct());
        assert!(!report.is_direct());
    }
}
