//! Marker-synchronised epoch segmentation
//!
//! The segmenter walks a [`StreamLog`] in non-overlapping windows of
//! `epoch_length` samples starting at index 0. A window becomes an
//! [`Epoch`] only when every marker inside it is the same accepted label;
//! otherwise it is discarded. The cursor always advances by a full window,
//! and a trailing partial window is dropped.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::stream::StreamLog;
use crate::types::{LabelSet, Marker};

/// Segmentation configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Epoch length in samples (L)
    pub epoch_length: usize,
    /// Markers accepted as epoch labels
    pub labels: LabelSet,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            epoch_length: 1000,
            labels: LabelSet::default(),
        }
    }
}

/// A labelled, fixed-length slice of the recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    /// Label shared by every sample in the slice
    pub label: Marker,
    /// Index of the first sample in the source log
    pub start: usize,
    /// Channel-major data: `data[channel][time]`
    pub data: Vec<Vec<f64>>,
}

impl Epoch {
    /// Create an epoch from channel-major data
    #[must_use]
    pub fn new(label: Marker, start: usize, data: Vec<Vec<f64>>) -> Self {
        Self { label, start, data }
    }

    /// Number of channels
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.data.len()
    }

    /// Number of samples per channel
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Whether the epoch holds no samples
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index one past the last sample in the source log
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len()
    }
}

/// Lazy iterator over the epochs of a log.
///
/// Finite and single-pass; restart by calling [`segment`] again.
#[derive(Clone, Debug)]
pub struct Segments<'a> {
    log: &'a StreamLog,
    epoch_length: usize,
    labels: LabelSet,
    cursor: usize,
    discarded: usize,
}

impl<'a> Segments<'a> {
    /// Windows discarded so far (mixed or unaccepted labels)
    #[inline]
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    fn build_epoch(&self, start: usize, label: Marker) -> Epoch {
        let window = &self.log.samples()[start..start + self.epoch_length];
        let channels = self.log.channel_count().unwrap_or(0);

        let data = (0..channels)
            .map(|ch| window.iter().map(|s| s.channels[ch]).collect())
            .collect();

        Epoch::new(label, start, data)
    }
}

impl Iterator for Segments<'_> {
    type Item = Epoch;

    fn next(&mut self) -> Option<Epoch> {
        let markers = self.log.markers();

        while self.cursor + self.epoch_length <= markers.len() {
            let start = self.cursor;
            self.cursor += self.epoch_length;

            let span = &markers[start..start + self.epoch_length];
            let label = span[0];
            if self.labels.contains(label) && span.iter().all(|&m| m == label) {
                return Some(self.build_epoch(start, label));
            }
            self.discarded += 1;
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.log.len() - self.cursor.min(self.log.len())) / self.epoch_length;
        (0, Some(remaining))
    }
}

/// Segment `log` into epochs of `epoch_length` samples labelled from `labels`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidConfig`] if `epoch_length` is zero.
pub fn segment(log: &StreamLog, epoch_length: usize, labels: LabelSet) -> Result<Segments<'_>, CoreError> {
    if epoch_length == 0 {
        return Err(CoreError::InvalidConfig {
            reason: "epoch_length must be positive",
        });
    }

    Ok(Segments {
        log,
        epoch_length,
        labels,
        cursor: 0,
        discarded: 0,
    })
}

/// Outcome of a full segmentation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentSummary {
    /// Epochs emitted
    pub emitted: usize,
    /// Complete windows discarded
    pub discarded: usize,
    /// Samples dropped at the tail
    pub trailing: usize,
    /// Epochs per marker value
    pub per_label: [usize; 4],
}

/// Segment the whole log with `config`, returning epochs and a summary.
///
/// # Errors
///
/// Returns [`CoreError::InvalidConfig`] if the epoch length is zero.
pub fn segment_all(log: &StreamLog, config: &SegmentConfig) -> Result<(Vec<Epoch>, SegmentSummary), CoreError> {
    let mut segments = segment(log, config.epoch_length, config.labels)?;
    let epochs: Vec<Epoch> = segments.by_ref().collect();

    let mut per_label = [0usize; 4];
    for epoch in &epochs {
        per_label[epoch.label.value() as usize] += 1;
    }

    let summary = SegmentSummary {
        emitted: epochs.len(),
        discarded: segments.discarded(),
        trailing: log.len() % config.epoch_length,
        per_label,
    };

    Ok((epochs, summary))
}

// ============================================================================
// Tests
// ============================================================================
