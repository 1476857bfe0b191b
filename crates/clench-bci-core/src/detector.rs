//! Adaptive-threshold clench detector
//!
//! Turns a stream of [`Sample`]s into discrete clench onsets. Each sample is
//! reduced to its mean absolute amplitude, pushed into a one-second rolling
//! window, and compared against `mean(window) + extra_threshold`.
//!
//! # State machine
//!
//! ```text
//!            magnitude > threshold
//!            && since_fire > refractory + cooldown
//!   ┌──────┐ ─────────────────────────────────────▶ ┌────────┐
//!   │ Idle │        (emits ClenchStarted)           │ Active │
//!   └──────┘ ◀───────────────────────────────────── └────────┘
//!            magnitude < threshold × rearm_ratio
//!            && since_fire > cooldown
//! ```
//!
//! The hysteresis band between `rearm_ratio × threshold` and `threshold`,
//! together with the refractory lockout, keeps one sustained contraction
//! from producing multiple events. A contraction held at constant amplitude
//! fires once in total: the rolling mean rises towards the signal, so it
//! never falls below the re-arm level until the jaw relaxes.
//!
//! Timestamps are supplied by the caller so the detector never reads a
//! clock.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::math::RollingWindow;
use crate::types::Sample;

/// Detector configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Rolling window length in samples (W)
    pub window_len: usize,
    /// Additive offset above the rolling mean
    pub extra_threshold: f64,
    /// Dead time after a firing (µs)
    pub refractory_us: u64,
    /// Extra delay before re-arming (µs)
    pub cooldown_us: u64,
    /// Fraction of the threshold the signal must fall below to re-arm
    pub rearm_ratio: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_len: 125,
            extra_threshold: 100.0,
            refractory_us: 1_500_000,
            cooldown_us: 500_000,
            rearm_ratio: 0.8,
        }
    }
}

impl DetectorConfig {
    /// Default configuration with a one-second window at `sample_rate_hz`
    #[must_use]
    pub fn for_sample_rate(sample_rate_hz: u32) -> Self {
        Self {
            window_len: sample_rate_hz as usize,
            ..Self::default()
        }
    }

    /// Check that values are usable
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a zero window or a re-arm
    /// ratio outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.window_len == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "detector window_len must be positive",
            });
        }
        if !(self.rearm_ratio > 0.0 && self.rearm_ratio <= 1.0) {
            return Err(CoreError::InvalidConfig {
                reason: "detector rearm_ratio must be in (0, 1]",
            });
        }
        Ok(())
    }

    /// Minimum spacing between two firings (µs)
    #[inline]
    #[must_use]
    pub const fn lockout_us(&self) -> u64 {
        self.refractory_us + self.cooldown_us
    }
}

/// Detector output for one sample
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventSignal {
    /// Nothing happened
    None,
    /// A clench onset was detected on this sample
    ClenchStarted,
}

/// Detector phase
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DetectorPhase {
    /// Armed and waiting for a contraction
    Idle,
    /// A contraction fired and detection is not yet re-armed
    Active,
}

/// Snapshot of the detector's internal state
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DetectorState {
    /// Current phase
    pub phase: DetectorPhase,
    /// Number of magnitudes in the rolling window
    pub window_len: usize,
    /// Current threshold
    pub threshold: f64,
    /// Timestamp of the last firing (µs)
    pub last_fire_us: Option<u64>,
}

/// Online clench detector
#[derive(Clone, Debug)]
pub struct ClenchDetector {
    config: DetectorConfig,
    window: RollingWindow,
    phase: DetectorPhase,
    last_fire_us: Option<u64>,
    threshold: f64,
    events_fired: u64,
}

impl ClenchDetector {
    /// Create a detector
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: DetectorConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            window: RollingWindow::new(config.window_len),
            threshold: config.extra_threshold,
            config,
            phase: DetectorPhase::Idle,
            last_fire_us: None,
            events_fired: 0,
        })
    }

    /// Feed one sample observed at `timestamp_us`
    pub fn observe(&mut self, sample: &Sample, timestamp_us: u64) -> EventSignal {
        self.observe_magnitude(sample.magnitude(), timestamp_us)
    }

    /// Feed a pre-reduced magnitude observed at `timestamp_us`
    pub fn observe_magnitude(&mut self, magnitude: f64, timestamp_us: u64) -> EventSignal {
        self.window.push(magnitude);
        self.threshold = self.window.mean() + self.config.extra_threshold;

        let since_fire = self
            .last_fire_us
            .map(|t| timestamp_us.saturating_sub(t));

        match self.phase {
            DetectorPhase::Idle => {
                let unlocked = since_fire.map_or(true, |dt| dt > self.config.lockout_us());
                if magnitude > self.threshold && unlocked {
                    self.phase = DetectorPhase::Active;
                    self.last_fire_us = Some(timestamp_us);
                    self.events_fired += 1;
                    return EventSignal::ClenchStarted;
                }
            }
            DetectorPhase::Active => {
                let cooled = since_fire.map_or(true, |dt| dt > self.config.cooldown_us);
                if magnitude < self.threshold * self.config.rearm_ratio && cooled {
                    self.phase = DetectorPhase::Idle;
                }
            }
        }

        EventSignal::None
    }

    /// Current threshold (rolling mean + offset)
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    /// Number of magnitudes held in the rolling window
    #[inline]
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Total clench events emitted
    #[inline]
    #[must_use]
    pub fn events_fired(&self) -> u64 {
        self.events_fired
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Snapshot of the internal state
    #[must_use]
    pub fn state(&self) -> DetectorState {
        DetectorState {
            phase: self.phase,
            window_len: self.window.len(),
            threshold: self.threshold,
            last_fire_us: self.last_fire_us,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
