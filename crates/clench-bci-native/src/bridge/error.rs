//! Transport error types

use thiserror::Error;

/// Errors from device and actuator transports
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Port I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Device stopped delivering data
    #[error("Device disconnected: {reason}")]
    Disconnected {
        /// What was observed
        reason: String,
    },

    /// Transport configuration is unusable
    #[error("Invalid transport config: {reason}")]
    InvalidConfig {
        /// Description of the issue
        reason: String,
    },
}

/// Result type for transport operations
pub type BridgeResult<T> = Result<T, BridgeError>;
