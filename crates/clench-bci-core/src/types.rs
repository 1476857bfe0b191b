//! Core data types for the clench BCI
//!
//! This module defines the values that flow between the acquisition path
//! and the offline analysis path:
//!
//! - [`Sample`]: one multi-channel reading
//! - [`Marker`]: operator label attached to every sample
//! - [`LabelSet`]: markers accepted as epoch labels
//! - [`FrequencyBand`]: sub-bands used by the classification filter bank

use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default number of channels on a Cyton board.
pub const DEFAULT_CHANNEL_COUNT: usize = 8;

// ============================================================================
// Sample
// ============================================================================

/// Single multi-channel reading.
///
/// The timestamp is implicit in arrival order; `sequence` is the device's
/// packet counter and is only used for gap detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Channel readings, one per electrode
    pub channels: Vec<f64>,
    /// Device sequence number (wraps)
    pub sequence: u32,
}

impl Sample {
    /// Create a sample from channel readings
    #[inline]
    #[must_use]
    pub fn new(channels: Vec<f64>, sequence: u32) -> Self {
        Self { channels, sequence }
    }

    /// Create a sample with every channel set to `value`
    #[must_use]
    pub fn uniform(channel_count: usize, value: f64, sequence: u32) -> Self {
        Self {
            channels: alloc::vec![value; channel_count],
            sequence,
        }
    }

    /// Number of channels
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Mean absolute amplitude across channels.
    ///
    /// This is the scalar the clench detector thresholds. An empty sample
    /// has magnitude zero.
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        if self.channels.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.channels.iter().map(|&v| libm::fabs(v)).sum();
        sum / self.channels.len() as f64
    }
}

// ============================================================================
// Marker
// ============================================================================

/// Operator-supplied label in `0..=3`; `0` means "no label".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Marker(u8);

impl Marker {
    /// The "no label" marker
    pub const NONE: Self = Self(0);
    /// Largest valid marker value
    pub const MAX: u8 = 3;
    /// Every valid marker, in ascending order
    pub const ALL: [Self; 4] = [Self(0), Self(1), Self(2), Self(3)];

    /// Create a marker, rejecting values above [`Marker::MAX`]
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMarker`] for values outside `0..=3`.
    pub const fn new(value: u8) -> Result<Self, CoreError> {
        if value > Self::MAX {
            Err(CoreError::InvalidMarker { value })
        } else {
            Ok(Self(value))
        }
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Whether this is the "no label" marker
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for Marker {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Marker> for u8 {
    fn from(marker: Marker) -> Self {
        marker.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// LabelSet
// ============================================================================

/// Set of markers accepted as epoch labels, stored as a 4-bit mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct LabelSet(u8);

impl LabelSet {
    /// No labels accepted
    pub const EMPTY: Self = Self(0);
    /// Markers 1, 2 and 3 (rest periods excluded)
    pub const ACTIVE: Self = Self(0b1110);
    /// Every marker including 0
    pub const ALL: Self = Self(0b1111);

    /// Build a set from markers
    #[must_use]
    pub fn from_markers(markers: &[Marker]) -> Self {
        markers.iter().fold(Self::EMPTY, |set, &m| set.with(m))
    }

    /// Return a copy with `marker` added
    #[inline]
    #[must_use]
    pub const fn with(self, marker: Marker) -> Self {
        Self(self.0 | (1 << marker.0))
    }

    /// Whether `marker` is in the set
    #[inline]
    #[must_use]
    pub const fn contains(self, marker: Marker) -> bool {
        self.0 & (1 << marker.0) != 0
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate members in ascending order
    pub fn iter(self) -> impl Iterator<Item = Marker> {
        Marker::ALL.into_iter().filter(move |&m| self.contains(m))
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::ACTIVE
    }
}

impl TryFrom<Vec<u8>> for LabelSet {
    type Error = CoreError;

    fn try_from(values: Vec<u8>) -> Result<Self, Self::Error> {
        let mut set = Self::EMPTY;
        for value in values {
            set = set.with(Marker::new(value)?);
        }
        Ok(set)
    }
}

impl From<LabelSet> for Vec<u8> {
    fn from(set: LabelSet) -> Self {
        set.iter().map(Marker::value).collect()
    }
}

// ============================================================================
// Frequency bands
// ============================================================================

/// Frequency sub-bands recognised by the classification filter bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyBand {
    /// Delta: 0.5-4 Hz
    Delta,
    /// Theta: 4-8 Hz
    Theta,
    /// Alpha: 8-12 Hz
    Alpha,
    /// Beta: 12-30 Hz
    Beta,
    /// Gamma: 30-45 Hz
    Gamma,
}

impl FrequencyBand {
    /// Every band, low to high
    pub const ALL: [Self; 5] = [Self::Delta, Self::Theta, Self::Alpha, Self::Beta, Self::Gamma];

    /// Get the cutoff frequencies for this band (low, high) in Hz
    #[inline]
    #[must_use]
    pub const fn range_hz(self) -> (f64, f64) {
        match self {
            Self::Delta => (0.5, 4.0),
            Self::Theta => (4.0, 8.0),
            Self::Alpha => (8.0, 12.0),
            Self::Beta => (12.0, 30.0),
            Self::Gamma => (30.0, 45.0),
        }
    }

    /// Get the band name
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Theta => "theta",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Gamma => "gamma",
        }
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_marker_validation() {
        assert_eq!(Marker::new(2).map(Marker::value), Ok(2));
        assert_eq!(Marker::new(4), Err(CoreError::InvalidMarker { value: 4 }));
        assert!(Marker::NONE.is_none());
    }

    #[test]
    fn test_sample_magnitude_is_mean_absolute() {
        let sample = Sample::new(vec![-4.0, 2.0, 0.0, 2.0], 0);
        assert!((sample.magnitude() - 2.0).abs() < 1e-12);
        assert_eq!(Sample::new(Vec::new(), 0).magnitude(), 0.0);
    }

    #[test]
    fn test_label_set_membership() {
        let set = LabelSet::default();
        assert!(!set.contains(Marker::NONE));
        assert!(set.contains(Marker::new(3).unwrap()));

        let members: Vec<u8> = LabelSet::ALL.into();
        assert_eq!(members, vec![0, 1, 2, 3]);

        assert!(LabelSet::try_from(vec![1, 7]).is_err());
    }

    #[test]
    fn test_band_ranges_are_ordered() {
        for band in FrequencyBand::ALL {
            let (low, high) = band.range_hz();
            assert!(low < high, "{band} range inverted");
        }
    }
}
