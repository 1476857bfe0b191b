//! Relative band power of epochs
//!
//! A Hann-windowed one-sided periodogram per channel, summed over each
//! band's bins and normalised so the bands of one channel add up to one.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use clench_bci_core::segment::Epoch;
use clench_bci_core::types::FrequencyBand;

/// Per-band power summaries for fixed-length epochs
pub struct BandPowerAnalyzer {
    len: usize,
    bin_hz: f64,
    plan: Arc<dyn Fft<f64>>,
    taper: Vec<f64>,
    /// Periodogram scale, `1 / (fs · Σ taper²)`
    scale: f64,
    work: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl BandPowerAnalyzer {
    /// Analyzer for signals of `len` samples at `sample_rate_hz`
    #[must_use]
    pub fn new(len: usize, sample_rate_hz: f64) -> Self {
        let len = len.max(1);
        let plan = FftPlanner::new().plan_fft_forward(len);
        let scratch = vec![Complex::default(); plan.get_inplace_scratch_len()];
        let taper = hann(len);
        let energy: f64 = taper.iter().map(|w| w * w).sum();

        Self {
            len,
            bin_hz: sample_rate_hz / len as f64,
            plan,
            scale: 1.0 / (sample_rate_hz * energy.max(f64::EPSILON)),
            taper,
            work: vec![Complex::default(); len],
            scratch,
        }
    }

    /// Width of one frequency bin (Hz)
    #[must_use]
    pub fn bin_width_hz(&self) -> f64 {
        self.bin_hz
    }

    /// One-sided power spectral density, `len / 2 + 1` bins.
    ///
    /// Input beyond `len` samples is ignored; shorter input is zero-padded.
    pub fn periodogram(&mut self, signal: &[f64]) -> Vec<f64> {
        let padded = signal.iter().copied().chain(std::iter::repeat(0.0));
        for ((slot, x), w) in self.work.iter_mut().zip(padded).zip(&self.taper) {
            *slot = Complex::new(x * w, 0.0);
        }
        self.plan.process_with_scratch(&mut self.work, &mut self.scratch);

        let bins = self.len / 2 + 1;
        let nyquist = (self.len % 2 == 0).then_some(bins - 1);
        (0..bins)
            .map(|k| {
                let p = self.work[k].norm_sqr() * self.scale;
                // DC and Nyquist have no mirrored twin
                if k == 0 || Some(k) == nyquist {
                    p
                } else {
                    2.0 * p
                }
            })
            .collect()
    }

    /// Power summed over bins whose centre lies in `[low_hz, high_hz]`
    #[must_use]
    pub fn power_between(&self, psd: &[f64], low_hz: f64, high_hz: f64) -> f64 {
        psd.iter()
            .enumerate()
            .filter(|&(k, _)| {
                let f = k as f64 * self.bin_hz;
                f >= low_hz && f <= high_hz
            })
            .map(|(_, p)| p)
            .sum()
    }

    /// Power of each band as a fraction of the listed bands' total.
    ///
    /// All zeros when the signal has no power in any band.
    #[must_use]
    pub fn relative_powers(&self, psd: &[f64], bands: &[FrequencyBand]) -> Vec<f64> {
        let absolute: Vec<f64> = bands
            .iter()
            .map(|band| {
                let (low, high) = band.range_hz();
                self.power_between(psd, low, high)
            })
            .collect();
        let total: f64 = absolute.iter().sum();
        if total <= 0.0 {
            return vec![0.0; bands.len()];
        }
        absolute.into_iter().map(|p| p / total).collect()
    }

    /// Relative band powers averaged over the channels of `epoch`
    pub fn epoch_profile(&mut self, epoch: &Epoch, bands: &[FrequencyBand]) -> Vec<f64> {
        let mut profile = vec![0.0; bands.len()];
        if epoch.data.is_empty() {
            return profile;
        }
        for channel in &epoch.data {
            let psd = self.periodogram(channel);
            let rel = self.relative_powers(&psd, bands);
            profile.iter_mut().zip(rel).for_each(|(acc, p)| *acc += p);
        }
        let channels = epoch.data.len() as f64;
        profile.iter_mut().for_each(|p| *p /= channels);
        profile
    }
}

fn hann(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n).map(|i| (PI * i as f64 / denom).sin().powi(2)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clench_bci_core::types::Marker;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    #[test]
    fn test_alpha_tone_lands_in_alpha() {
        let mut analyzer = BandPowerAnalyzer::new(256, 250.0);
        let psd = analyzer.periodogram(&tone(10.0, 250.0, 256));

        let alpha = analyzer.power_between(&psd, 8.0, 12.0);
        let total: f64 = psd.iter().sum();
        assert!(alpha > total * 0.9);
    }

    #[test]
    fn test_relative_powers_sum_to_one() {
        let mut analyzer = BandPowerAnalyzer::new(250, 125.0);
        let signal: Vec<f64> = tone(6.0, 125.0, 250)
            .into_iter()
            .zip(tone(20.0, 125.0, 250))
            .map(|(a, b)| a + b)
            .collect();
        let psd = analyzer.periodogram(&signal);
        let rel = analyzer.relative_powers(&psd, &FrequencyBand::ALL);

        assert!((rel.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        // theta and beta
        assert!(rel[1] > 0.3);
        assert!(rel[3] > 0.3);
    }

    #[test]
    fn test_silent_epoch_has_zero_profile() {
        let mut analyzer = BandPowerAnalyzer::new(100, 125.0);
        let epoch = Epoch::new(Marker::new(1).unwrap(), 0, vec![vec![0.0; 100]; 2]);
        assert_eq!(analyzer.epoch_profile(&epoch, &FrequencyBand::ALL), vec![0.0; 5]);
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let mut analyzer = BandPowerAnalyzer::new(64, 125.0);
        let psd = analyzer.periodogram(&[1.0; 10]);
        assert_eq!(psd.len(), 33);
        assert!((analyzer.bin_width_hz() - 125.0 / 64.0).abs() < 1e-12);
    }

    #[test]
    fn test_odd_length_has_no_nyquist_bin() {
        let mut analyzer = BandPowerAnalyzer::new(125, 125.0);
        assert_eq!(analyzer.periodogram(&tone(5.0, 125.0, 125)).len(), 63);
    }
}
