//! Sample delivery interface

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clench_bci_core::types::Sample;

use super::error::BridgeResult;

/// Cloneable stop flag shared by the listener, the source and the app.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// Create an unset flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A device that pushes samples into a callback.
///
/// Implementations call `sink` once per sample, in order, never
/// re-entrantly, from the thread that called [`SampleSource::stream`].
/// The sink must return within one sample period.
pub trait SampleSource {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Nominal sample rate in Hz
    fn sample_rate_hz(&self) -> f64;

    /// Deliver samples until `shutdown` is requested or the device stops.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device fails mid-stream.
    fn stream(&mut self, sink: &mut dyn FnMut(Sample), shutdown: &Shutdown) -> BridgeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_shared() {
        let flag = Shutdown::new();
        let clone = flag.clone();
        assert!(!clone.is_requested());
        flag.request();
        assert!(clone.is_requested());
    }
}
