//! Shared current-marker cell

use std::sync::{Arc, Mutex, PoisonError};

use clench_bci_core::types::Marker;

/// The marker that applies to the next recorded sample.
///
/// Written by the key listener and read by the streaming thread. Cloning
/// shares the same cell.
#[derive(Clone, Debug, Default)]
pub struct MarkerStore {
    current: Arc<Mutex<Marker>>,
}

impl MarkerStore {
    /// Create a store holding [`Marker::NONE`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current marker
    pub fn set(&self, marker: Marker) {
        // A panicking writer cannot leave a `Marker` half-written
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = marker;
    }

    /// Read the current marker
    #[must_use]
    pub fn get(&self) -> Marker {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unlabelled() {
        assert_eq!(MarkerStore::new().get(), Marker::NONE);
    }

    #[test]
    fn test_clones_share_state() {
        let store = MarkerStore::new();
        let writer = store.clone();
        writer.set(Marker::new(2).unwrap());
        assert_eq!(store.get().value(), 2);
    }

    #[test]
    fn test_concurrent_writers_leave_a_valid_marker() {
        let store = MarkerStore::new();
        let handles: Vec<_> = (1..=3)
            .map(|v| {
                let s = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        s.set(Marker::new(v).unwrap());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!((1..=3).contains(&store.get().value()));
    }
}
