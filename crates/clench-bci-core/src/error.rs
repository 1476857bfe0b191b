//! Error types for the clench BCI core
//!
//! Errors are plain enums with a hand-written `Display` so they work in
//! `no_std` environments without heap allocation.

use core::fmt;

/// Errors raised by core types and algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Marker value outside `0..=3`
    InvalidMarker {
        /// The rejected value
        value: u8,
    },
    /// Sample channel count differs from the stream's
    ChannelCountMismatch {
        /// Channel count established by the first sample
        expected: usize,
        /// Channel count of the rejected sample
        got: usize,
    },
    /// Configuration value out of range
    InvalidConfig {
        /// Description of the issue
        reason: &'static str,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMarker { value } => {
                write!(f, "Invalid marker {value}: expected 0..=3")
            }
            Self::ChannelCountMismatch { expected, got } => {
                write!(f, "Channel count mismatch: stream has {expected}, sample has {got}")
            }
            Self::InvalidConfig { reason } => write!(f, "Invalid config: {reason}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}
