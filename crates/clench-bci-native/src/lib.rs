//! Clench BCI Native - Host streaming, transports and classification
//!
//! This crate provides the host side of the clench BCI:
//! - Device transports (Cyton board, actuator, simulated source)
//! - The streaming session: marker listener, recorder and clench actuation
//! - Band-pass filtering and spectral summaries
//! - Offline epoch classification with filter-bank CSP
//!
//! # Modules
//!
//! - [`bridge`]: Sample sources and the actuator link
//! - [`session`]: Marker store, key listener, recorder and [`StreamSession`]
//! - [`processing`]: Signal processing
//! - [`ml`]: Classification pipeline and model persistence
//! - [`config`]: JSON session configuration
//!
//! # Features
//!
//! - `serial` (default): Cyton and actuator over serial ports
//! - `keyboard` (default): Raw-mode terminal key listener

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod bridge;
pub mod config;
pub mod ml;
pub mod processing;
pub mod session;

// Re-export key types
pub use bridge::{Actuator, BridgeError, NullActuator, SampleSource, Shutdown, SimulatedSource, SimulationConfig};
pub use config::{ConfigError, SessionConfig};
pub use ml::{ClassificationPipeline, PipelineConfig, PipelineError, TrainedModel, TrainingMetrics};
pub use session::{MarkerListener, MarkerStore, SessionStats, StreamSession};
