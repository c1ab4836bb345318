//! Scripted radio for tests and demos

use crate::hardware::{CommError, CommResult, RadioPacket, RadioTransceiver, TransceiverStatus};
use std::collections::VecDeque;

/// Mock radio replaying queued packets and recording everything sent
pub struct MockRadio {
    name: String,
    status: TransceiverStatus,
    inbox: VecDeque<CommResult<RadioPacket>>,
    sent_messages: Vec<Vec<u8>>,
    connected: bool,
    max_payload: usize,
}

impl MockRadio {
    /// Create a new mock radio
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: TransceiverStatus::connected(),
            inbox: VecDeque::new(),
            sent_messages: Vec::new(),
            connected: true,
            max_payload: 240,
        }
    }

    /// Queue a text message as if heard with the given RSSI
    pub fn add_message(&mut self, message: &str, rssi_dbm: i32) {
        self.inbox.push_back(Ok(RadioPacket::text(message, rssi_dbm)));
    }

    /// Queue a fully specified packet
    pub fn add_packet(&mut self, packet: RadioPacket) {
        self.inbox.push_back(Ok(packet));
    }

    /// Make a future receive call fail, in queue order
    pub fn add_error(&mut self, error: CommError) {
        self.inbox.push_back(Err(error));
    }

    /// Simulate connection loss
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.status.connected = false;
    }

    /// Restore connection
    pub fn reconnect(&mut self) {
        self.connected = true;
        self.status.connected = true;
    }

    /// Get all payloads that were sent through this radio
    pub fn sent_messages(&self) -> &[Vec<u8>] {
        &self.sent_messages
    }

    /// Sent payloads decoded as text
    pub fn sent_text(&self) -> Vec<String> {
        self.sent_messages
            .iter()
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .collect()
    }

    /// Get the number of queued packets
    pub fn queued_message_count(&self) -> usize {
        self.inbox.len()
    }
}

impl RadioTransceiver for MockRadio {
    fn receive(&mut self) -> CommResult<Option<RadioPacket>> {
        if !self.connected {
            return Err(CommError::ConnectionLost {
                radio: self.name.clone(),
            });
        }

        match self.inbox.pop_front() {
            Some(Ok(packet)) => {
                self.status.record_received(&packet);
                Ok(Some(packet))
            }
            Some(Err(error)) => {
                self.status.error_count += 1;
                Err(error)
            }
            None => Ok(None),
        }
    }

    fn send(&mut self, data: &[u8]) -> CommResult<()> {
        if !self.connected {
            return Err(CommError::ConnectionLost {
                radio: self.name.clone(),
            });
        }

        if data.len() > self.max_payload {
            return Err(CommError::PayloadTooLarge {
                size: data.len(),
                limit: self.max_payload,
            });
        }

        self.sent_messages.push(data.to_vec());
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
