//! Clench BCI Core - `no_std` types and online algorithms
//!
//! This crate holds the parts of the clench BCI that must behave the same on
//! a host and on an embedded target: the sample/marker data model, the
//! adaptive-threshold clench detector, and marker-synchronised epoch
//! segmentation. It only needs `alloc`.
//!
//! # Modules
//!
//! - [`types`]: Samples, markers, label sets and frequency bands
//! - [`error`]: Core error type
//! - [`math`]: Rolling window and small statistics helpers
//! - [`detector`]: Adaptive-threshold clench detector
//! - [`stream`]: Index-aligned sample/marker log
//! - [`segment`]: Epoch segmentation
//!
//! # Features
//!
//! - `std`: Implement `std::error::Error` for [`CoreError`]
//!
//! # Example
//!
//! ```rust
//! use clench_bci_core::detector::{ClenchDetector, DetectorConfig, EventSignal};
//! use clench_bci_core::types::Sample;
//!
//! let mut detector = ClenchDetector::new(DetectorConfig::for_sample_rate(125)).unwrap();
//! let mut t = 0;
//! for _ in 0..125 {
//!     detector.observe(&Sample::uniform(8, 10.0, 0), t);
//!     t += 8_000;
//! }
//! let event = detector.observe(&Sample::uniform(8, 500.0, 0), t);
//! assert_eq!(event, EventSignal::ClenchStarted);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod detector;
pub mod error;
pub mod math;
pub mod segment;
pub mod stream;
pub mod types;

// Re-export commonly used types at crate root
pub use detector::{ClenchDetector, DetectorConfig, DetectorPhase, DetectorState, EventSignal};
pub use error::CoreError;
pub use math::RollingWindow;
pub use segment::{segment, segment_all, Epoch, SegmentConfig, SegmentSummary, Segments};
pub use stream::StreamLog;
pub use types::{FrequencyBand, LabelSet, Marker, Sample, DEFAULT_CHANNEL_COUNT};
