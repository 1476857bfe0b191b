//! Index-aligned sample and marker logs

use alloc::vec::Vec;

use crate::error::CoreError;
use crate::types::{Marker, Sample};

/// Append-only recording of a streaming session.
///
/// Samples and markers are appended pairwise, so index `i` of both
/// sequences always refers to the same moment.
#[derive(Clone, Debug, Default)]
pub struct StreamLog {
    samples: Vec<Sample>,
    markers: Vec<Marker>,
    channel_count: Option<usize>,
}

impl StreamLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log with room for `capacity` samples
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            markers: Vec::with_capacity(capacity),
            channel_count: None,
        }
    }

    /// Append one (sample, marker) pair.
    ///
    /// The first sample fixes the channel count of the log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChannelCountMismatch`] if the sample's channel
    /// count differs from the log's; nothing is appended in that case.
    pub fn push(&mut self, sample: Sample, marker: Marker) -> Result<(), CoreError> {
        let got = sample.channel_count();
        match self.channel_count {
            Some(expected) if expected != got => {
                return Err(CoreError::ChannelCountMismatch { expected, got });
            }
            Some(_) => {}
            None => self.channel_count = Some(got),
        }

        self.samples.push(sample);
        self.markers.push(marker);
        Ok(())
    }

    /// Number of recorded pairs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing has been recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Channel count fixed by the first sample
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> Option<usize> {
        self.channel_count
    }

    /// Recorded samples
    #[inline]
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Recorded markers
    #[inline]
    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Number of samples recorded under each marker, indexed by marker value
    #[must_use]
    pub fn marker_histogram(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for m in &self.markers {
            counts[m.value() as usize] += 1;
        }
        counts
    }
}
