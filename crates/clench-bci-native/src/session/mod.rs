//! Streaming session
//!
//! - [`marker`]: Shared current-marker cell
//! - [`listener`]: Key listener thread writing the marker
//! - [`recorder`]: Marker-tagged stream recorder
//!
//! [`StreamSession`] ties them to the clench detector and the actuator. It
//! is the body of the transport callback and runs on the delivery thread.

pub mod listener;
pub mod marker;
pub mod recorder;

use std::time::Instant;

use clench_bci_core::detector::{ClenchDetector, DetectorConfig, EventSignal};
use clench_bci_core::error::CoreError;
use clench_bci_core::stream::StreamLog;
use clench_bci_core::types::Sample;

use crate::bridge::Actuator;

pub use listener::{KeyAction, KeyInput, ListenerStats, MarkerListener, ScriptedKeys, DEFAULT_DEBOUNCE};
pub use marker::MarkerStore;
pub use recorder::StreamRecorder;

#[cfg(feature = "keyboard")]
pub use listener::TerminalKeys;

/// Counters for one streaming session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Samples delivered by the source
    pub samples: u64,
    /// Clench onsets detected
    pub clench_events: u64,
    /// Toggle commands that failed to send
    pub actuator_failures: u64,
    /// Samples dropped for a mismatched channel count
    pub rejected_samples: u64,
    /// Discontinuities in the device sequence numbers
    pub sequence_gaps: u64,
}

/// Per-sample processing: detect, actuate, record.
pub struct StreamSession {
    detector: ClenchDetector,
    recorder: StreamRecorder,
    actuator: Box<dyn Actuator>,
    started: Instant,
    last_sequence: Option<u32>,
    stats: SessionStats,
}

impl StreamSession {
    /// Create a session recording against `markers`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the detector config is invalid.
    pub fn new(
        detector: DetectorConfig,
        markers: MarkerStore,
        actuator: Box<dyn Actuator>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            detector: ClenchDetector::new(detector)?,
            recorder: StreamRecorder::new(markers),
            actuator,
            started: Instant::now(),
            last_sequence: None,
            stats: SessionStats::default(),
        })
    }

    /// Handle a sample stamped with the session clock
    pub fn on_sample(&mut self, sample: Sample) -> EventSignal {
        #[allow(clippy::cast_possible_truncation)]
        let now_us = self.started.elapsed().as_micros() as u64;
        self.on_sample_at(sample, now_us)
    }

    /// Handle a sample with an explicit timestamp in microseconds
    pub fn on_sample_at(&mut self, sample: Sample, timestamp_us: u64) -> EventSignal {
        self.stats.samples += 1;

        if let Some(last) = self.last_sequence {
            if sample.sequence != last.wrapping_add(1) {
                self.stats.sequence_gaps += 1;
            }
        }
        self.last_sequence = Some(sample.sequence);

        let event = self.detector.observe(&sample, timestamp_us);
        if event == EventSignal::ClenchStarted {
            self.stats.clench_events += 1;
            tracing::info!(
                "Clench detected at {:.3}s (threshold {:.1})",
                timestamp_us as f64 / 1e6,
                self.detector.threshold()
            );
            if let Err(e) = self.actuator.toggle() {
                self.stats.actuator_failures += 1;
                tracing::warn!("Actuator toggle failed: {}", e);
            }
        }

        if let Err(e) = self.recorder.record(sample) {
            self.stats.rejected_samples += 1;
            tracing::warn!("Sample not recorded: {}", e);
        }

        event
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Detector state for status output
    #[must_use]
    pub fn detector(&self) -> &ClenchDetector {
        &self.detector
    }

    /// End the session
    #[must_use]
    pub fn finish(self) -> (StreamLog, SessionStats) {
        (self.recorder.into_log(), self.stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::bridge::{BridgeError, BridgeResult};
    use clench_bci_core::types::Marker;

    const PERIOD_US: u64 = 8_000;

    struct BrokenActuator;

    impl Actuator for BrokenActuator {
        fn send(&mut self, _command: u8) -> BridgeResult<()> {
            Err(BridgeError::Disconnected {
                reason: "unplugged".to_string(),
            })
        }
    }

    struct CountingActuator(Arc<AtomicU64>);

    impl Actuator for CountingActuator {
        fn send(&mut self, command: u8) -> BridgeResult<()> {
            assert_eq!(command, b'T');
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn feed(session: &mut StreamSession, values: &[f64], t: &mut u64, seq: &mut u32) -> Vec<EventSignal> {
        values
            .iter()
            .map(|&v| {
                let e = session.on_sample_at(Sample::uniform(8, v, *seq), *t);
                *t += PERIOD_US;
                *seq += 1;
                e
            })
            .collect()
    }

    #[test]
    fn test_clench_toggles_actuator_once() {
        let count = Arc::new(AtomicU64::new(0));
        let mut session = StreamSession::new(
            DetectorConfig::default(),
            MarkerStore::new(),
            Box::new(CountingActuator(count.clone())),
        )
        .unwrap();

        let (mut t, mut seq) = (0, 0);
        feed(&mut session, &[10.0; 125], &mut t, &mut seq);
        let events = feed(&mut session, &[500.0; 5], &mut t, &mut seq);

        assert_eq!(events[0], EventSignal::ClenchStarted);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(session.stats().clench_events, 1);
    }

    #[test]
    fn test_actuator_failure_does_not_stop_recording() {
        let store = MarkerStore::new();
        let mut session =
            StreamSession::new(DetectorConfig::default(), store.clone(), Box::new(BrokenActuator)).unwrap();

        let (mut t, mut seq) = (0, 0);
        feed(&mut session, &[10.0; 125], &mut t, &mut seq);
        store.set(Marker::new(1).unwrap());
        feed(&mut session, &[500.0; 10], &mut t, &mut seq);

        let (log, stats) = session.finish();
        assert_eq!(log.len(), 135);
        assert_eq!(stats.samples, 135);
        assert_eq!(stats.clench_events, 1);
        assert_eq!(stats.actuator_failures, 1);
        assert_eq!(log.markers()[134].value(), 1);
    }

    #[test]
    fn test_ragged_sample_counted_not_fatal() {
        let mut session = StreamSession::new(
            DetectorConfig::default(),
            MarkerStore::new(),
            Box::new(crate::bridge::NullActuator::new()),
        )
        .unwrap();

        session.on_sample_at(Sample::uniform(8, 1.0, 0), 0);
        session.on_sample_at(Sample::uniform(3, 1.0, 1), PERIOD_US);
        session.on_sample_at(Sample::uniform(8, 1.0, 2), 2 * PERIOD_US);

        let (log, stats) = session.finish();
        assert_eq!(log.len(), 2);
        assert_eq!(stats.rejected_samples, 1);
    }

    #[test]
    fn test_sequence_gaps_counted() {
        let mut session = StreamSession::new(
            DetectorConfig::default(),
            MarkerStore::new(),
            Box::new(crate::bridge::NullActuator::new()),
        )
        .unwrap();

        for (i, seq) in [0, 1, 2, 5, 6, 9].into_iter().enumerate() {
            session.on_sample_at(Sample::uniform(8, 1.0, seq), i as u64 * PERIOD_US);
        }
        assert_eq!(session.stats().sequence_gaps, 2);
    }
}
