//! Communication error types and handling

use thiserror::Error;

/// Communication error types for radio transceivers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommError {
    /// Connection to the radio failed or was lost
    #[error("connection lost to radio {radio}")]
    ConnectionLost { radio: String },
    /// Invalid or truncated frame received
    #[error("invalid frame: {details}")]
    InvalidFrame { details: String },
    /// Underlying port I/O failure
    #[error("port I/O error during {operation}: {details}")]
    Io { operation: &'static str, details: String },
    /// Frame larger than the radio accepts
    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

/// Result type for communication operations
pub type CommResult<T> = Result<T, CommError>;

/// Error recovery strategy for communication failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Wait and then retry
    RetryWithDelay { delay_ms: u32 },
    /// Drop the frame and continue
    Skip,
    /// Fail permanently
    Fail,
}

impl CommError {
    pub(crate) fn io(operation: &'static str, error: std::io::Error) -> Self {
        CommError::Io {
            operation,
            details: error.to_string(),
        }
    }

    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CommError::ConnectionLost { .. } => RecoveryStrategy::RetryWithDelay { delay_ms: 1000 },
            CommError::InvalidFrame { .. } => RecoveryStrategy::Skip,
            CommError::Io { .. } => RecoveryStrategy::RetryWithDelay { delay_ms: 100 },
            CommError::PayloadTooLarge { .. } => RecoveryStrategy::Fail,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.recovery_strategy(), RecoveryStrategy::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_strategies() {
        assert!(CommError::ConnectionLost { radio: "sx126x".into() }.is_recoverable());
        assert_eq!(
            CommError::InvalidFrame { details: "short".into() }.recovery_strategy(),
            RecoveryStrategy::Skip
        );
        assert!(!CommError::PayloadTooLarge { size: 300, limit: 240 }.is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = CommError::ConnectionLost { radio: "sx126x".into() };
        assert_eq!(err.to_string(), "connection lost to radio sx126x");
    }
}
