//! Error types for the miband-rust-ble crate.

use thiserror::Error;

/// Errors produced while decoding a raw characteristic payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is shorter than the field being read requires.
    #[error("Payload truncated: need {needed} bytes, got {actual}")]
    Truncated {
        /// Number of bytes the field requires.
        needed: usize,
        /// Number of bytes actually available.
        actual: usize,
    },
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The operation needs a ready session or a characteristic that was not negotiated.
    #[error("{operation}: invalid setup")]
    InvalidSetup {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The requested discovered-device index does not exist.
    #[error("Device index {index} out of range ({count} discovered)")]
    DeviceIndexOutOfRange {
        /// The index that was requested.
        index: usize,
        /// The number of discovered devices.
        count: usize,
    },

    /// A characteristic payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The transport rejected or failed an operation.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },

    /// The health-record sink failed to store a sample.
    #[error("Health record error: {reason}")]
    HealthRecord {
        /// Description of the failure.
        reason: String,
    },

    /// The band session task is no longer running.
    #[error("Band session closed")]
    SessionClosed,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a transport error from anything printable.
    pub fn transport(reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }

    /// Check if this error was caused by a missing precondition.
    pub fn is_invalid_setup(&self) -> bool {
        matches!(self, Self::InvalidSetup { .. })
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_setup_display() {
        let error = Error::InvalidSetup {
            operation: "Start monitoring",
        };
        assert_eq!(error.to_string(), "Start monitoring: invalid setup");
        assert!(error.is_invalid_setup());
    }

    #[test]
    fn test_decode_error_converts() {
        let error: Error = DecodeError::Truncated {
            needed: 7,
            actual: 3,
        }
        .into();
        assert!(!error.is_invalid_setup());
        assert!(error.to_string().contains("need 7 bytes, got 3"));
    }
}
