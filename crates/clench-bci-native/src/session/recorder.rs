//! Marker-tagged stream recorder

use clench_bci_core::error::CoreError;
use clench_bci_core::stream::StreamLog;
use clench_bci_core::types::{Marker, Sample};

use super::marker::MarkerStore;

/// Appends every sample with the marker current at arrival time.
#[derive(Debug)]
pub struct StreamRecorder {
    log: StreamLog,
    markers: MarkerStore,
}

impl StreamRecorder {
    /// Record against `markers`
    #[must_use]
    pub fn new(markers: MarkerStore) -> Self {
        Self {
            log: StreamLog::new(),
            markers,
        }
    }

    /// Append `sample`, returning the marker it was tagged with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChannelCountMismatch`] for a sample whose width
    /// differs from earlier ones; the log is left unchanged.
    pub fn record(&mut self, sample: Sample) -> Result<Marker, CoreError> {
        let marker = self.markers.get();
        self.log.push(sample, marker)?;
        Ok(marker)
    }

    /// Recorded pairs so far
    #[must_use]
    pub fn log(&self) -> &StreamLog {
        &self.log
    }

    /// Take the finished log
    #[must_use]
    pub fn into_log(self) -> StreamLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_with_current_marker() {
        let store = MarkerStore::new();
        let mut recorder = StreamRecorder::new(store.clone());

        recorder.record(Sample::uniform(2, 1.0, 0)).unwrap();
        store.set(Marker::new(3).unwrap());
        recorder.record(Sample::uniform(2, 1.0, 1)).unwrap();
        recorder.record(Sample::uniform(2, 1.0, 2)).unwrap();

        let log = recorder.into_log();
        let values: Vec<u8> = log.markers().iter().map(|m| m.value()).collect();
        assert_eq!(values, vec![0, 3, 3]);
        assert_eq!(log.samples().len(), log.markers().len());
    }

    #[test]
    fn test_ragged_sample_rejected() {
        let mut recorder = StreamRecorder::new(MarkerStore::new());
        recorder.record(Sample::uniform(8, 0.0, 0)).unwrap();
        assert!(recorder.record(Sample::uniform(4, 0.0, 1)).is_err());
        assert_eq!(recorder.log().len(), 1);
    }
}
