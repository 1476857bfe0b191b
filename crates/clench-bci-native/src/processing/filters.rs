//! Digital filters for band decomposition
//!
//! Butterworth band-pass filters built from cascaded second-order sections,
//! and a filter bank that splits an epoch into the standard frequency bands.

use std::f64::consts::PI;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use clench_bci_core::segment::Epoch;
use clench_bci_core::types::FrequencyBand;

use crate::ml::error::{PipelineError, PipelineResult};

/// Highest usable cutoff as a fraction of the sample rate
const MAX_CUTOFF_RATIO: f64 = 0.49;

/// Second-order section coefficients, normalised so `a0 = 1`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    /// Numerator coefficients [b0, b1, b2]
    pub b: [f64; 3],
    /// Denominator coefficients [a1, a2]
    pub a: [f64; 2],
}

/// Second-order biquad filter section (direct form II transposed)
#[derive(Clone, Debug)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    /// State: [z1, z2]
    state: [f64; 2],
}

impl Biquad {
    /// Create a new biquad section with given coefficients
    #[must_use]
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self { coeffs, state: [0.0, 0.0] }
    }

    /// Second-order lowpass section with quality factor `q`
    #[must_use]
    pub fn lowpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        let k = (PI * cutoff / sample_rate).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);

        Self::new(BiquadCoeffs {
            b: [k2 * norm, 2.0 * k2 * norm, k2 * norm],
            a: [2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm],
        })
    }

    /// Second-order highpass section with quality factor `q`
    #[must_use]
    pub fn highpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        let k = (PI * cutoff / sample_rate).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);

        Self::new(BiquadCoeffs {
            b: [norm, -2.0 * norm, norm],
            a: [2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm],
        })
    }

    /// Process a single sample
    pub fn filter(&mut self, input: f64) -> f64 {
        let BiquadCoeffs { b, a } = self.coeffs;
        let output = b[0] * input + self.state[0];
        self.state[0] = b[1] * input - a[0] * output + self.state[1];
        self.state[1] = b[2] * input - a[1] * output;
        output
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.state = [0.0, 0.0];
    }

    /// Filter coefficients
    #[must_use]
    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }
}

/// Quality factors of the sections of an order-`2 * sections` Butterworth
/// filter.
#[must_use]
pub fn butterworth_q(sections: usize) -> Vec<f64> {
    let order = 2 * sections;
    (0..sections)
        .map(|k| {
            let theta = PI * (2 * k + 1) as f64 / (2 * order) as f64;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

/// Butterworth band-pass: a highpass cascade followed by a lowpass cascade
#[derive(Clone, Debug)]
pub struct BandpassFilter {
    highpass: Vec<Biquad>,
    lowpass: Vec<Biquad>,
}

impl BandpassFilter {
    /// Create a bandpass filter with `sections` second-order sections per side
    #[must_use]
    pub fn new(sample_rate: f64, low_cutoff: f64, high_cutoff: f64, sections: usize) -> Self {
        let qs = butterworth_q(sections);
        Self {
            highpass: qs.iter().map(|&q| Biquad::highpass(sample_rate, low_cutoff, q)).collect(),
            lowpass: qs.iter().map(|&q| Biquad::lowpass(sample_rate, high_cutoff, q)).collect(),
        }
    }

    /// Process a single sample
    pub fn filter(&mut self, input: f64) -> f64 {
        let hp_out = self.highpass.iter_mut().fold(input, |x, s| s.filter(x));
        self.lowpass.iter_mut().fold(hp_out, |x, s| s.filter(x))
    }

    /// Filter a whole signal from rest
    pub fn filter_signal(&mut self, input: &[f64]) -> Vec<f64> {
        self.reset();
        input.iter().map(|&x| self.filter(x)).collect()
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.highpass.iter_mut().chain(self.lowpass.iter_mut()).for_each(Biquad::reset);
    }
}

/// Splits epochs into frequency bands
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BandFilterBank {
    sample_rate_hz: f64,
    bands: Vec<FrequencyBand>,
    sections: usize,
}

impl BandFilterBank {
    /// Create a filter bank
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a non-positive sample
    /// rate, zero sections, no bands, or a band that lies entirely above
    /// the usable cutoff for this rate.
    pub fn new(sample_rate_hz: f64, bands: Vec<FrequencyBand>, sections: usize) -> PipelineResult<Self> {
        if !(sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidConfig {
                reason: format!("sample rate must be positive, got {sample_rate_hz}"),
            });
        }
        if sections == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "filter needs at least one section".to_string(),
            });
        }
        if bands.is_empty() {
            return Err(PipelineError::InvalidConfig {
                reason: "no frequency bands selected".to_string(),
            });
        }

        let bank = Self {
            sample_rate_hz,
            bands,
            sections,
        };
        for &band in &bank.bands {
            let (low, high) = bank.cutoffs(band);
            if low >= high {
                return Err(PipelineError::InvalidConfig {
                    reason: format!("{band} band is above the usable range at {sample_rate_hz} Hz"),
                });
            }
        }
        Ok(bank)
    }

    /// Bands in output order
    #[must_use]
    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    /// Sample rate the bank was designed for
    #[must_use]
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Effective cutoffs for `band`, with the upper edge clamped below Nyquist
    #[must_use]
    pub fn cutoffs(&self, band: FrequencyBand) -> (f64, f64) {
        let (low, high) = band.range_hz();
        (low, high.min(MAX_CUTOFF_RATIO * self.sample_rate_hz))
    }

    /// Design a fresh filter for `band`
    #[must_use]
    pub fn filter_for(&self, band: FrequencyBand) -> BandpassFilter {
        let (low, high) = self.cutoffs(band);
        BandpassFilter::new(self.sample_rate_hz, low, high, self.sections)
    }

    /// Filter every channel of `epoch` into each band.
    ///
    /// Returns one channels × samples matrix per band. Each channel is
    /// filtered from rest.
    #[must_use]
    pub fn apply(&self, epoch: &Epoch) -> Vec<DMatrix<f64>> {
        let channels = epoch.channel_count();
        let len = epoch.len();

        self.bands
            .iter()
            .map(|&band| {
                let mut filter = self.filter_for(band);
                let rows: Vec<Vec<f64>> = epoch.data.iter().map(|ch| filter.filter_signal(ch)).collect();
                DMatrix::from_fn(channels, len, |r, c| rows[r][c])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clench_bci_core::types::Marker;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_single_section_is_classic_butterworth() {
        let qs = butterworth_q(1);
        assert!((qs[0] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_lowpass_dc_gain_is_unity() {
        let mut lp = Biquad::lowpass(125.0, 10.0, std::f64::consts::FRAC_1_SQRT_2);
        let out: Vec<f64> = (0..500).map(|_| lp.filter(1.0)).collect();
        assert!((out[499] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bandpass_passes_in_band_and_rejects_out_of_band() {
        let fs = 125.0;
        let mut alpha = BandpassFilter::new(fs, 8.0, 12.0, 2);

        let pass = alpha.filter_signal(&sine(10.0, fs, 1000));
        let stop = alpha.filter_signal(&sine(40.0, fs, 1000));

        assert!(rms(&pass[500..]) > 0.4);
        assert!(rms(&stop[500..]) < 0.05);
    }

    #[test]
    fn test_bank_output_shape() {
        let bank = BandFilterBank::new(125.0, FrequencyBand::ALL.to_vec(), 2).unwrap();
        let data = vec![sine(10.0, 125.0, 250); 3];
        let epoch = Epoch::new(Marker::new(1).unwrap(), 0, data);

        let out = bank.apply(&epoch);
        assert_eq!(out.len(), 5);
        for m in &out {
            assert_eq!(m.shape(), (3, 250));
        }
    }

    #[test]
    fn test_gamma_clamped_at_low_rate() {
        let bank = BandFilterBank::new(80.0, vec![FrequencyBand::Gamma], 1).unwrap();
        let (low, high) = bank.cutoffs(FrequencyBand::Gamma);
        assert_eq!(low, 30.0);
        assert!((high - 39.2).abs() < 1e-9);
    }

    #[test]
    fn test_band_above_nyquist_rejected() {
        let result = BandFilterBank::new(50.0, vec![FrequencyBand::Gamma], 2);
        assert!(matches!(result, Err(PipelineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_empty_band_list_rejected() {
        assert!(BandFilterBank::new(125.0, Vec::new(), 2).is_err());
    }
}
