//! Synthetic EMG source for running without hardware
//!
//! Produces uniform noise on every channel. Two effects are added on top:
//! - a periodic clench burst that raises the magnitude on all channels
//! - a class-specific sinusoid on channel `m - 1` while marker `m` is active,
//!   read live from a [`MarkerStore`]

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use clench_bci_core::types::Sample;

use super::error::{BridgeError, BridgeResult};
use super::source::{SampleSource, Shutdown};
use crate::session::MarkerStore;

/// Synthetic signal parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sample rate (Hz)
    pub sample_rate_hz: f64,
    /// Channels per sample
    pub channel_count: usize,
    /// Peak noise amplitude
    pub noise_amplitude: f64,
    /// Amplitude of the labelled-class sinusoid
    pub class_amplitude: f64,
    /// Frequency of the labelled-class sinusoid (Hz)
    pub class_frequency_hz: f64,
    /// Time between clench bursts (s); 0 disables bursts
    pub clench_interval_s: f64,
    /// Length of each burst (s)
    pub clench_duration_s: f64,
    /// Peak burst amplitude
    pub clench_amplitude: f64,
    /// Pace output at the sample rate instead of as fast as possible
    pub realtime: bool,
    /// Stop after this many seconds; `None` runs until shutdown
    pub duration_s: Option<f64>,
    /// RNG seed
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 125.0,
            channel_count: 8,
            noise_amplitude: 20.0,
            class_amplitude: 60.0,
            class_frequency_hz: 10.0,
            clench_interval_s: 4.0,
            clench_duration_s: 0.3,
            clench_amplitude: 600.0,
            realtime: true,
            duration_s: None,
            seed: 42,
        }
    }
}

/// Noise generator implementing [`SampleSource`]
pub struct SimulatedSource {
    config: SimulationConfig,
    markers: Option<MarkerStore>,
    rng: StdRng,
    index: u64,
}

impl SimulatedSource {
    /// Create a source
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] for a non-positive rate or
    /// zero channels.
    pub fn new(config: SimulationConfig) -> BridgeResult<Self> {
        if !(config.sample_rate_hz > 0.0) {
            return Err(BridgeError::InvalidConfig {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if config.channel_count == 0 {
            return Err(BridgeError::InvalidConfig {
                reason: "channel count must be non-zero".to_string(),
            });
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            markers: None,
            rng,
            index: 0,
        })
    }

    /// Modulate the output with whatever marker `store` currently holds
    #[must_use]
    pub fn with_markers(mut self, store: MarkerStore) -> Self {
        self.markers = Some(store);
        self
    }

    /// Produce the next sample without pacing
    pub fn next_sample(&mut self) -> Sample {
        let cfg = &self.config;
        let t = self.index as f64 / cfg.sample_rate_hz;

        let in_burst = cfg.clench_interval_s > 0.0
            && t % cfg.clench_interval_s >= cfg.clench_interval_s - cfg.clench_duration_s;

        let class_channel = self
            .markers
            .as_ref()
            .map(MarkerStore::get)
            .filter(|m| !m.is_none())
            .map(|m| usize::from(m.value() - 1) % cfg.channel_count);

        let class_wave = cfg.class_amplitude * (TAU * cfg.class_frequency_hz * t).sin();

        let channels = (0..cfg.channel_count)
            .map(|ch| {
                let mut v = self.rng.gen_range(-cfg.noise_amplitude..=cfg.noise_amplitude);
                if class_channel == Some(ch) {
                    v += class_wave;
                }
                if in_burst {
                    let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                    v += sign * cfg.clench_amplitude * self.rng.gen_range(0.5..=1.0);
                }
                v
            })
            .collect();

        #[allow(clippy::cast_possible_truncation)]
        let sample = Sample::new(channels, self.index as u32);
        self.index += 1;
        sample
    }

    fn sample_limit(&self) -> Option<u64> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        self.config
            .duration_s
            .map(|d| (d * self.config.sample_rate_hz).round().max(0.0) as u64)
    }
}

impl SampleSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn sample_rate_hz(&self) -> f64 {
        self.config.sample_rate_hz
    }

    fn stream(&mut self, sink: &mut dyn FnMut(Sample), shutdown: &Shutdown) -> BridgeResult<()> {
        let limit = self.sample_limit();
        let period = Duration::from_secs_f64(1.0 / self.config.sample_rate_hz);
        let started = Instant::now();
        let first = self.index;

        while !shutdown.is_requested() {
            if limit.is_some_and(|n| self.index - first >= n) {
                break;
            }

            if self.config.realtime {
                // Pace against the start time so sleep jitter does not accumulate
                #[allow(clippy::cast_possible_truncation)]
                let due = started + period * (self.index - first) as u32;
                if let Some(wait) = due.checked_duration_since(Instant::now()) {
                    std::thread::sleep(wait);
                }
            }

            let sample = self.next_sample();
            sink(sample);
        }

        tracing::debug!("Simulated source produced {} samples", self.index - first);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clench_bci_core::types::Marker;

    fn fast(config: SimulationConfig) -> SimulationConfig {
        SimulationConfig {
            realtime: false,
            ..config
        }
    }

    #[test]
    fn test_duration_limits_sample_count() {
        let mut source = SimulatedSource::new(fast(SimulationConfig {
            duration_s: Some(2.0),
            ..SimulationConfig::default()
        }))
        .unwrap();

        let mut count = 0;
        source.stream(&mut |_| count += 1, &Shutdown::new()).unwrap();
        assert_eq!(count, 250);
    }

    #[test]
    fn test_shutdown_stops_stream() {
        let mut source = SimulatedSource::new(fast(SimulationConfig::default())).unwrap();
        let shutdown = Shutdown::new();
        let stopper = shutdown.clone();

        let mut count = 0;
        source
            .stream(
                &mut |_| {
                    count += 1;
                    if count == 10 {
                        stopper.request();
                    }
                },
                &shutdown,
            )
            .unwrap();
        assert_eq!(count, 10);
    }

    #[test]
    fn test_bursts_raise_magnitude() {
        let mut source = SimulatedSource::new(fast(SimulationConfig {
            clench_interval_s: 1.0,
            clench_duration_s: 0.2,
            ..SimulationConfig::default()
        }))
        .unwrap();

        let samples: Vec<Sample> = (0..125).map(|_| source.next_sample()).collect();
        let quiet = samples[0].magnitude();
        let burst = samples[120].magnitude();
        assert!(quiet <= 20.0);
        assert!(burst >= 250.0);
    }

    #[test]
    fn test_marker_drives_class_channel() {
        let store = MarkerStore::new();
        store.set(Marker::new(2).unwrap());
        let mut source = SimulatedSource::new(fast(SimulationConfig {
            noise_amplitude: 0.0,
            clench_interval_s: 0.0,
            ..SimulationConfig::default()
        }))
        .unwrap()
        .with_markers(store);

        let samples: Vec<Sample> = (0..50).map(|_| source.next_sample()).collect();
        let energy = |ch: usize| samples.iter().map(|s| s.channels[ch].abs()).sum::<f64>();
        assert!(energy(1) > 100.0);
        assert_eq!(energy(0), 0.0);
        assert_eq!(energy(2), 0.0);
    }

    #[test]
    fn test_rejects_zero_channels() {
        let result = SimulatedSource::new(SimulationConfig {
            channel_count: 0,
            ..SimulationConfig::default()
        });
        assert!(matches!(result, Err(BridgeError::InvalidConfig { .. })));
    }
}
