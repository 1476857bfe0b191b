//! Operator key listener
//!
//! Runs on its own thread, turning key presses into marker updates on a
//! [`MarkerStore`]. Keys `0`-`3` set the marker; `q`, `Esc` or `Ctrl-C`
//! request shutdown.

use std::collections::VecDeque;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clench_bci_core::types::{LabelSet, Marker};

use super::marker::MarkerStore;
use crate::bridge::Shutdown;

/// Default minimum spacing between accepted marker changes
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a key press asks for
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Change the current marker
    SetMarker(Marker),
    /// End the session
    Quit,
}

/// Source of operator key actions.
pub trait KeyInput: Send {
    /// Wait up to `timeout` for the next action.
    ///
    /// # Errors
    ///
    /// Returns an error if the input device fails; the listener stops.
    fn next_action(&mut self, timeout: Duration) -> anyhow::Result<Option<KeyAction>>;
}

/// Counters reported when the listener exits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Marker changes written to the store
    pub accepted: u64,
    /// Marker changes dropped by the debounce
    pub debounced: u64,
}

/// Applies key actions to a marker store with debouncing
pub struct MarkerListener {
    store: MarkerStore,
    shutdown: Shutdown,
    debounce: Duration,
}

impl MarkerListener {
    /// Create a listener
    #[must_use]
    pub fn new(store: MarkerStore, shutdown: Shutdown, debounce: Duration) -> Self {
        Self {
            store,
            shutdown,
            debounce,
        }
    }

    /// Process actions until quit or shutdown.
    ///
    /// A marker change arriving within `debounce` of the last accepted one
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Propagates input device errors. Shutdown is not requested in that
    /// case; streaming continues with the last marker.
    pub fn run(&self, input: &mut dyn KeyInput) -> anyhow::Result<ListenerStats> {
        let mut stats = ListenerStats::default();
        let mut last_accepted: Option<Instant> = None;

        while !self.shutdown.is_requested() {
            match input.next_action(POLL_INTERVAL)? {
                Some(KeyAction::SetMarker(marker)) => {
                    let now = Instant::now();
                    if last_accepted.is_some_and(|t| now.duration_since(t) < self.debounce) {
                        stats.debounced += 1;
                        continue;
                    }
                    last_accepted = Some(now);
                    self.store.set(marker);
                    stats.accepted += 1;
                    tracing::info!("Marker set to {}", marker);
                }
                Some(KeyAction::Quit) => {
                    tracing::info!("Quit requested");
                    self.shutdown.request();
                }
                None => {}
            }
        }

        Ok(stats)
    }

    /// Run on a background thread. Input errors are logged and end only
    /// the listener.
    pub fn spawn(self, mut input: Box<dyn KeyInput>) -> JoinHandle<ListenerStats> {
        std::thread::spawn(move || match self.run(input.as_mut()) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("Marker listener stopped: {:#}", e);
                ListenerStats::default()
            }
        })
    }
}

/// Pre-recorded key sequence for demos and tests.
///
/// Each step is emitted once the previous step's hold time has elapsed;
/// after the last step the input emits [`KeyAction::Quit`].
#[derive(Debug)]
pub struct ScriptedKeys {
    steps: VecDeque<(KeyAction, Duration)>,
    next_due: Option<Instant>,
}

impl ScriptedKeys {
    /// Script from explicit (action, hold) steps
    #[must_use]
    pub fn new(steps: Vec<(KeyAction, Duration)>) -> Self {
        Self {
            steps: steps.into(),
            next_due: None,
        }
    }

    /// Hold each label in `labels` for `dwell`, `rounds` times over, then
    /// clear the marker.
    #[must_use]
    pub fn cycle(labels: LabelSet, dwell: Duration, rounds: usize) -> Self {
        let mut steps: Vec<_> = (0..rounds)
            .flat_map(|_| labels.iter().map(move |m| (KeyAction::SetMarker(m), dwell)))
            .collect();
        steps.push((KeyAction::SetMarker(Marker::NONE), Duration::ZERO));
        Self::new(steps)
    }

    /// Total time the script runs for
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.steps.iter().map(|(_, hold)| *hold).sum()
    }
}

impl KeyInput for ScriptedKeys {
    fn next_action(&mut self, timeout: Duration) -> anyhow::Result<Option<KeyAction>> {
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if now < due {
            std::thread::sleep((due - now).min(timeout));
            return Ok(None);
        }

        Ok(Some(match self.steps.pop_front() {
            Some((action, hold)) => {
                self.next_due = Some(now + hold);
                action
            }
            None => KeyAction::Quit,
        }))
    }
}

/// Raw-mode terminal keyboard input.
///
/// Raw mode is enabled on construction and restored on drop.
#[cfg(feature = "keyboard")]
pub struct TerminalKeys {
    _private: (),
}

#[cfg(feature = "keyboard")]
impl TerminalKeys {
    /// Put the terminal into raw mode
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be switched to raw mode.
    pub fn new() -> anyhow::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

#[cfg(feature = "keyboard")]
impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            tracing::warn!("Failed to restore terminal: {}", e);
        }
    }
}

#[cfg(feature = "keyboard")]
impl KeyInput for TerminalKeys {
    fn next_action(&mut self, timeout: Duration) -> anyhow::Result<Option<KeyAction>> {
        use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

        if !event::poll(timeout)? {
            return Ok(None);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(None);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(None);
        }

        let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        if ctrl_c {
            return Ok(Some(KeyAction::Quit));
        }

        Ok(match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
            KeyCode::Char(c @ '0'..='3') => {
                let value = c as u8 - b'0';
                Marker::new(value).ok().map(KeyAction::SetMarker)
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(v: u8) -> (KeyAction, Duration) {
        (KeyAction::SetMarker(Marker::new(v).unwrap()), Duration::ZERO)
    }

    struct FailingKeys;

    impl KeyInput for FailingKeys {
        fn next_action(&mut self, _timeout: Duration) -> anyhow::Result<Option<KeyAction>> {
            anyhow::bail!("device unplugged")
        }
    }

    #[test]
    fn test_debounce_keeps_first_of_rapid_presses() {
        let store = MarkerStore::new();
        let shutdown = Shutdown::new();
        let listener = MarkerListener::new(store.clone(), shutdown.clone(), Duration::from_secs(10));

        let mut keys = ScriptedKeys::new(vec![set(1), set(2), set(3)]);
        let stats = listener.run(&mut keys).unwrap();

        assert_eq!(store.get().value(), 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.debounced, 2);
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_zero_debounce_last_press_wins() {
        let store = MarkerStore::new();
        let listener = MarkerListener::new(store.clone(), Shutdown::new(), Duration::ZERO);

        let mut keys = ScriptedKeys::new(vec![set(1), set(2), set(3)]);
        let stats = listener.run(&mut keys).unwrap();

        assert_eq!(store.get().value(), 3);
        assert_eq!(stats.accepted, 3);
    }

    #[test]
    fn test_external_shutdown_ends_listener() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let listener = MarkerListener::new(MarkerStore::new(), shutdown, DEFAULT_DEBOUNCE);

        let mut keys = ScriptedKeys::new(vec![set(2)]);
        let stats = listener.run(&mut keys).unwrap();
        assert_eq!(stats, ListenerStats::default());
    }

    #[test]
    fn test_input_error_does_not_request_shutdown() {
        let shutdown = Shutdown::new();
        let listener = MarkerListener::new(MarkerStore::new(), shutdown.clone(), DEFAULT_DEBOUNCE);

        let handle = listener.spawn(Box::new(FailingKeys));
        assert_eq!(handle.join().unwrap(), ListenerStats::default());
        assert!(!shutdown.is_requested());
    }

    #[test]
    fn test_cycle_script_layout() {
        let keys = ScriptedKeys::cycle(LabelSet::ACTIVE, Duration::from_secs(2), 2);
        assert_eq!(keys.steps.len(), 7);
        assert_eq!(keys.duration(), Duration::from_secs(12));
        assert_eq!(
            keys.steps.back().map(|(a, _)| *a),
            Some(KeyAction::SetMarker(Marker::NONE))
        );
    }
}
