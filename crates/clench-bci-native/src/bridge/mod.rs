//! Device transports
//!
//! This module connects the session to the outside world:
//! - [`source`]: The [`SampleSource`] trait and the shared [`Shutdown`] flag
//! - [`cyton`]: OpenBCI Cyton packet parser and serial bridge
//! - [`actuator`]: Single-byte toggle link to an actuator board
//! - [`simulated`]: Synthetic source for demos and tests
//!
//! Serial transports require the `serial` feature.

pub mod actuator;
pub mod cyton;
pub mod error;
pub mod simulated;
pub mod source;

pub use actuator::{Actuator, NullActuator, TOGGLE_COMMAND};
pub use cyton::CytonParser;
pub use error::{BridgeError, BridgeResult};
pub use simulated::{SimulatedSource, SimulationConfig};
pub use source::{SampleSource, Shutdown};

#[cfg(feature = "serial")]
pub use actuator::SerialActuator;
#[cfg(feature = "serial")]
pub use cyton::CytonBridge;
