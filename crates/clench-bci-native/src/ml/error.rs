//! Classification pipeline error types

use clench_bci_core::error::CoreError;
use thiserror::Error;

/// Errors from fitting, applying or persisting a model
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Not enough labelled data to fit or evaluate
    #[error("Insufficient data: {reason}")]
    InsufficientData {
        /// What is missing
        reason: String,
    },

    /// Epoch shape differs from what the model was fitted on
    #[error(
        "Incompatible epoch shape: expected {expected_channels}x{expected_length}, \
         got {got_channels}x{got_length}"
    )]
    IncompatibleShape {
        /// Channels at fit time
        expected_channels: usize,
        /// Samples per epoch at fit time
        expected_length: usize,
        /// Channels received
        got_channels: usize,
        /// Samples per epoch received
        got_length: usize,
    },

    /// Degenerate input for a numerical step
    #[error("Numerical failure: {reason}")]
    Numerical {
        /// Which step failed
        reason: String,
    },

    /// Pipeline parameters are unusable
    #[error("Invalid pipeline config: {reason}")]
    InvalidConfig {
        /// Description of the issue
        reason: String,
    },

    /// Model file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Model file is not valid JSON for this format
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model file was written by an incompatible version
    #[error("Unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Version this build reads
        expected: u32,
    },

    /// Error from the core data model
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientData { reason: reason.into() }
    }

    pub(crate) fn numerical(reason: impl Into<String>) -> Self {
        Self::Numerical { reason: reason.into() }
    }
}
