//! Error types for the kiosk-ble crate.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Why a connection attempt did not reach the `Connected` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectFailure {
    /// The handshake did not complete before the caller's timeout elapsed.
    Timeout,
    /// The adapter or peripheral rejected the handshake.
    Rejected,
    /// The adapter disappeared or became unusable mid-attempt.
    AdapterUnavailable,
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Rejected => write!(f, "rejected"),
            Self::AdapterUnavailable => write!(f, "adapter unavailable"),
        }
    }
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth adapter not available or disabled")]
    AdapterUnavailable,

    /// Scanning could not be started on the adapter.
    #[error("Scan could not be started: {source}")]
    Adapter {
        /// The adapter error that prevented scanning.
        source: btleplug::Error,
    },

    /// No peripheral with the given address is known to the adapter.
    #[error("Device not found: {address}")]
    DeviceNotFound {
        /// The canonical address that was searched for.
        address: String,
    },

    /// Failed to establish a connection to the peripheral.
    #[error("Connection to {address} failed: {reason}")]
    Connection {
        /// The canonical address of the connection target.
        address: String,
        /// Classification of the failure.
        reason: ConnectFailure,
    },

    /// Operation invoked on a handle in an incompatible state.
    #[error("Invalid handle state: expected {expected}, was {actual}")]
    InvalidState {
        /// The state the operation requires.
        expected: ConnectionState,
        /// The state the handle was actually in.
        actual: ConnectionState,
    },

    /// The live session was lost while an operation was in flight.
    #[error("Transport lost to {address}")]
    TransportLost {
        /// The canonical address of the lost peripheral.
        address: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connect_failure_display() {
        assert_eq!(ConnectFailure::Timeout.to_string(), "timeout");
        assert_eq!(ConnectFailure::Rejected.to_string(), "rejected");
        assert_eq!(
            ConnectFailure::AdapterUnavailable.to_string(),
            "adapter unavailable"
        );
    }

    #[test]
    fn test_connection_error_message() {
        let err = Error::Connection {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            reason: ConnectFailure::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "Connection to AA:BB:CC:DD:EE:FF failed: timeout"
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidState {
            expected: ConnectionState::Connected,
            actual: ConnectionState::Idle,
        };
        assert_eq!(
            err.to_string(),
            "Invalid handle state: expected Connected, was Idle"
        );
    }
}
