//! Actuator output link
//!
//! The actuator is a microcontroller that flips a relay or LED each time it
//! receives the single byte [`TOGGLE_COMMAND`].

#[cfg(feature = "serial")]
use std::io::Write;
#[cfg(feature = "serial")]
use std::time::Duration;

use super::error::BridgeResult;

/// Byte that toggles the actuator state
pub const TOGGLE_COMMAND: u8 = b'T';
/// Default actuator baud rate
pub const DEFAULT_BAUD: u32 = 9_600;
/// Default wait after opening the port, covering the board's reset on connect
pub const DEFAULT_SETTLE_MS: u64 = 2_000;

/// Write-only command link to an actuator.
pub trait Actuator: Send {
    /// Send one command byte
    ///
    /// # Errors
    ///
    /// Returns a transport error if the byte could not be written.
    fn send(&mut self, command: u8) -> BridgeResult<()>;

    /// Send [`TOGGLE_COMMAND`]
    ///
    /// # Errors
    ///
    /// Returns a transport error if the byte could not be written.
    fn toggle(&mut self) -> BridgeResult<()> {
        self.send(TOGGLE_COMMAND)
    }
}

/// Actuator on a serial port
#[cfg(feature = "serial")]
pub struct SerialActuator {
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serial")]
impl SerialActuator {
    /// Open the port and wait `settle` for the board to come out of reset.
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be opened
    pub fn open(port_name: &str, baud_rate: u32, settle: Duration) -> BridgeResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_secs(1))
            .open()?;

        tracing::info!("Opened actuator on {} at {} baud", port_name, baud_rate);
        std::thread::sleep(settle);

        Ok(Self { port })
    }
}

#[cfg(feature = "serial")]
impl Actuator for SerialActuator {
    fn send(&mut self, command: u8) -> BridgeResult<()> {
        self.port.write_all(&[command])?;
        self.port.flush()?;
        Ok(())
    }
}

/// Actuator that only logs, for runs without hardware
#[derive(Debug, Default)]
pub struct NullActuator {
    sent: u64,
}

impl NullActuator {
    /// Create a logging actuator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Actuator for NullActuator {
    fn send(&mut self, command: u8) -> BridgeResult<()> {
        self.sent += 1;
        tracing::info!("Actuator command {:?} (no device attached)", char::from(command));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_actuator_counts_toggles() {
        let mut actuator = NullActuator::new();
        actuator.toggle().unwrap();
        actuator.toggle().unwrap();
        assert_eq!(actuator.sent(), 2);
    }
}
