//! Session configuration
//!
//! One JSON document covers the device links, the detector, segmentation
//! and the classification pipeline. Every field has a default, so a file
//! only needs the values it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use clench_bci_core::detector::DetectorConfig;
use clench_bci_core::error::CoreError;
use clench_bci_core::segment::SegmentConfig;

use crate::bridge::{actuator, cyton};
use crate::ml::{PipelineConfig, PipelineError};

/// Cyton rate with the daisy module or the 8-channel board over Wi-Fi off
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 125;

/// Errors loading or validating a [`SessionConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid JSON for this schema
    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid config: {reason}")]
    Invalid {
        /// Description of the issue
        reason: String,
    },

    /// Detector or segmentation section rejected
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Pipeline section rejected
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Everything a streaming and training run needs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cyton serial port; `None` means simulate
    pub device_port: Option<String>,
    /// Cyton baud rate
    pub device_baud: u32,
    /// Actuator serial port; `None` logs toggles only
    pub actuator_port: Option<String>,
    /// Actuator baud rate
    pub actuator_baud: u32,
    /// Wait after opening the actuator port (ms)
    pub actuator_settle_ms: u64,
    /// Device sample rate (Hz)
    pub sample_rate_hz: f64,
    /// Channels per sample
    pub channel_count: usize,
    /// Convert Cyton counts to microvolts
    pub scale_to_uv: bool,
    /// Minimum spacing between marker key presses (ms)
    pub debounce_ms: u64,
    /// Clench detector parameters
    pub detector: DetectorConfig,
    /// Epoch segmentation parameters
    pub segment: SegmentConfig,
    /// Classification parameters
    pub pipeline: PipelineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_port: None,
            device_baud: cyton::DEFAULT_BAUD,
            actuator_port: None,
            actuator_baud: actuator::DEFAULT_BAUD,
            actuator_settle_ms: actuator::DEFAULT_SETTLE_MS,
            sample_rate_hz: f64::from(DEFAULT_SAMPLE_RATE_HZ),
            channel_count: 8,
            scale_to_uv: false,
            debounce_ms: 300,
            detector: DetectorConfig::for_sample_rate(DEFAULT_SAMPLE_RATE_HZ),
            segment: SegmentConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Read a JSON config file
    ///
    /// # Errors
    ///
    /// Returns I/O or parse errors. The result is not validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        tracing::info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse a JSON config document.
    ///
    /// Unless `detector.window_len` is given, the detector window spans one
    /// second at `sample_rate_hz`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or wrong types.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let window_given = value.pointer("/detector/window_len").is_some();
        let mut config: Self = serde_json::from_value(value)?;
        if !window_given {
            config.detector.window_len = config.one_second_window();
        }
        Ok(config)
    }

    /// Samples in one second at the session rate, at least one
    #[must_use]
    pub fn one_second_window(&self) -> usize {
        if !(self.sample_rate_hz >= 1.0) {
            return 1;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let samples = self.sample_rate_hz.round() as usize;
        samples
    }

    /// Check every section
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(ConfigError::Invalid {
                reason: format!("sample_rate_hz must be positive, got {}", self.sample_rate_hz),
            });
        }
        if self.channel_count == 0 {
            return Err(ConfigError::Invalid {
                reason: "channel_count must be at least 1".to_string(),
            });
        }
        if self.segment.epoch_length == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "epoch length must be non-zero",
            }
            .into());
        }
        if self.segment.labels.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "segment.labels must name at least one marker".to_string(),
            });
        }
        self.detector.validate()?;
        self.pipeline_config().validate()?;
        Ok(())
    }

    /// Pipeline settings with the session sample rate applied
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate_hz: self.sample_rate_hz,
            ..self.pipeline.clone()
        }
    }

    /// Marker debounce window
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Actuator settle delay
    #[must_use]
    pub fn actuator_settle(&self) -> Duration {
        Duration::from_millis(self.actuator_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.device_baud, 115_200);
        assert_eq!(config.actuator_baud, 9_600);
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.segment.epoch_length, 1000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            SessionConfig::from_json(r#"{ "device_port": "/dev/ttyUSB0", "segment": { "epoch_length": 500 } }"#).unwrap();
        assert_eq!(config.device_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.segment.epoch_length, 500);
        assert_eq!(config.channel_count, 8);
        assert_eq!(config.detector.window_len, 125);
    }

    #[test]
    fn test_detector_window_follows_sample_rate() {
        let config = SessionConfig::from_json(r#"{ "sample_rate_hz": 250.0 }"#).unwrap();
        config.validate().unwrap();
        assert_eq!(config.detector.window_len, 250);

        let config =
            SessionConfig::from_json(r#"{ "sample_rate_hz": 250.0, "detector": { "extra_threshold": 80.0 } }"#).unwrap();
        assert_eq!(config.detector.window_len, 250);
        assert_eq!(config.detector.extra_threshold, 80.0);
    }

    #[test]
    fn test_explicit_detector_window_is_kept() {
        let config =
            SessionConfig::from_json(r#"{ "sample_rate_hz": 250.0, "detector": { "window_len": 60 } }"#).unwrap();
        assert_eq!(config.detector.window_len, 60);
    }

    #[test]
    fn test_zero_epoch_length_rejected() {
        let mut config = SessionConfig::default();
        config.segment.epoch_length = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Core(_))));
    }

    #[test]
    fn test_pipeline_inherits_session_rate() {
        let config = SessionConfig {
            sample_rate_hz: 250.0,
            ..SessionConfig::default()
        };
        assert_eq!(config.pipeline_config().sample_rate_hz, 250.0);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = SessionConfig::load("/nonexistent/clench-config.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
