//! SX126x LoRa module over a serial port
//!
//! With RSSI output enabled, the module appends one byte to every received
//! packet; the signal strength is `-(256 - byte)` dBm. One read from the port
//! is treated as one packet.

use crate::hardware::{CommError, CommResult, RadioPacket, RadioTransceiver, TransceiverStatus};
use crate::utils::config::SerialConfig;
use serialport::{SerialPort, SerialPortBuilder};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, info};

/// Register write that enables the trailing RSSI byte (byte 9 = 0xC3), saved to RAM only
pub const SX126X_CONFIG_FRAME: [u8; 12] = [
    0xC2, 0x00, 0x09, 0x00, 0x00, 0x00, 0x62, 0x00, 0x12, 0xC3, 0x00, 0x00,
];

/// Largest payload the module transmits in one packet
pub const SX126X_MAX_PAYLOAD: usize = 240;

/// Decode the appended RSSI byte into dBm
pub fn decode_rssi(byte: u8) -> i32 {
    -(256 - byte as i32)
}

/// Radio speaking the SX126x serial framing over any byte port
pub struct SerialRadio<P> {
    name: String,
    port: P,
    buffer: Vec<u8>,
    status: TransceiverStatus,
}

/// Line settings for the module's UART: 8N1, no flow control, bounded reads
pub fn port_builder(path: &str, config: &SerialConfig) -> SerialPortBuilder {
    serialport::new(path, config.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(config.read_timeout())
}

impl SerialRadio<Box<dyn SerialPort>> {
    /// Open a serial device with a read timeout, so `receive` returns
    /// `Ok(None)` on an idle channel instead of blocking.
    pub fn open(path: &str, config: &SerialConfig) -> CommResult<Self> {
        let port = port_builder(path, config).open().map_err(|e| CommError::Io {
            operation: "open",
            details: e.to_string(),
        })?;
        info!(
            port = path,
            baud_rate = config.baud_rate,
            read_timeout_ms = config.read_timeout_ms,
            "opened serial radio"
        );
        Ok(Self::new(path, port))
    }
}

impl<P: Read + Write> SerialRadio<P> {
    pub fn new(name: &str, port: P) -> Self {
        Self {
            name: name.to_string(),
            port,
            buffer: vec![0u8; SX126X_MAX_PAYLOAD + 16],
            status: TransceiverStatus::connected(),
        }
    }

    /// Write the RSSI-enabling register configuration to the module
    pub fn configure(&mut self) -> CommResult<()> {
        self.port
            .write_all(&SX126X_CONFIG_FRAME)
            .and_then(|_| self.port.flush())
            .map_err(|e| CommError::io("configure", e))?;
        debug!(radio = %self.name, "wrote SX126x configuration");
        Ok(())
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P: Read + Write> RadioTransceiver for SerialRadio<P> {
    fn receive(&mut self) -> CommResult<Option<RadioPacket>> {
        let read = match self.port.read(&mut self.buffer) {
            Ok(read) => read,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                return Ok(None);
            }
            Err(e) => {
                self.status.error_count += 1;
                return Err(CommError::io("read", e));
            }
        };

        if read == 0 {
            return Ok(None);
        }
        if read == self.buffer.len() {
            self.status.error_count += 1;
            return Err(CommError::InvalidFrame {
                details: format!("read filled the {} byte buffer", read),
            });
        }
        if read < 2 {
            self.status.error_count += 1;
            debug!(radio = %self.name, read, "discarding frame without payload");
            return Ok(None);
        }

        let rssi_dbm = decode_rssi(self.buffer[read - 1]);
        let packet = RadioPacket::new(self.buffer[..read - 1].to_vec(), rssi_dbm);
        self.status.record_received(&packet);
        Ok(Some(packet))
    }

    fn send(&mut self, data: &[u8]) -> CommResult<()> {
        if data.len() > SX126X_MAX_PAYLOAD {
            return Err(CommError::PayloadTooLarge {
                size: data.len(),
                limit: SX126X_MAX_PAYLOAD,
            });
        }

        if let Err(e) = self.port.write_all(data).and_then(|_| self.port.flush()) {
            self.status.error_count += 1;
            return Err(CommError::io("write", e));
        }
        self.status.messages_sent += 1;
        Ok(())
    }

    fn status(&self) -> TransceiverStatus {
        self.status.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
