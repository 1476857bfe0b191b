//! Signal processing
//!
//! - [`filters`]: Butterworth band-pass filters and the band filter bank
//! - [`spectrum`]: Periodogram band power summaries

pub mod filters;
pub mod spectrum;

pub use filters::{BandFilterBank, BandpassFilter, Biquad};
pub use spectrum::BandPowerAnalyzer;
