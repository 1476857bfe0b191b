//! OpenBCI Cyton serial bridge
//!
//! The Cyton streams fixed 33-byte packets over its USB dongle:
//!
//! ```text
//! [0]      0xA0 header
//! [1]      sample counter (wraps at 255)
//! [2..26]  8 channels × 24-bit big-endian two's complement
//! [26..32] 3 aux values × 16-bit
//! [32]     0xC0..=0xCF footer
//! ```
//!
//! Streaming starts with the ASCII command `b` and stops with `s`.

use clench_bci_core::types::Sample;

#[cfg(feature = "serial")]
use std::io::{Read, Write};
#[cfg(feature = "serial")]
use std::time::Duration;

#[cfg(feature = "serial")]
use super::error::BridgeResult;
#[cfg(feature = "serial")]
use super::source::{SampleSource, Shutdown};

/// Packet length in bytes
pub const PACKET_SIZE: usize = 33;
/// Packet header byte
pub const HEADER_BYTE: u8 = 0xA0;
/// EEG/EMG channels per packet
pub const CHANNELS: usize = 8;
/// Default serial baud rate
pub const DEFAULT_BAUD: u32 = 115_200;
/// Microvolts per ADC count at the default gain of 24
pub const UV_PER_COUNT: f64 = 4.5 / 24.0 / 8_388_607.0 * 1_000_000.0;

const START_STREAM: u8 = b'b';
const STOP_STREAM: u8 = b's';

/// Incremental packet parser with resynchronisation.
#[derive(Debug, Default)]
pub struct CytonParser {
    buffer: Vec<u8>,
    last_counter: Option<u8>,
    sequence: u32,
    gaps: u64,
    dropped_bytes: u64,
    scale: Option<f64>,
}

impl CytonParser {
    /// Parser yielding raw ADC counts
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            ..Self::default()
        }
    }

    /// Parser yielding microvolts
    #[must_use]
    pub fn microvolts() -> Self {
        Self {
            scale: Some(UV_PER_COUNT),
            ..Self::new()
        }
    }

    /// Append raw bytes from the port
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete packet, if any
    pub fn next_sample(&mut self) -> Option<Sample> {
        loop {
            // Discard bytes before any potential header
            let Some(pos) = self.buffer.iter().position(|&b| b == HEADER_BYTE) else {
                self.dropped_bytes += self.buffer.len() as u64;
                self.buffer.clear();
                return None;
            };
            if pos > 0 {
                self.dropped_bytes += pos as u64;
                self.buffer.drain(..pos);
            }

            if self.buffer.len() < PACKET_SIZE {
                return None;
            }

            if self.buffer[PACKET_SIZE - 1] & 0xF0 != 0xC0 {
                // False header inside payload data, skip it and search again
                self.dropped_bytes += 1;
                self.buffer.drain(..1);
                continue;
            }

            let packet: Vec<u8> = self.buffer.drain(..PACKET_SIZE).collect();
            return Some(self.decode(&packet));
        }
    }

    /// Number of detected sequence gaps
    #[must_use]
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Number of bytes discarded while resynchronising
    #[must_use]
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    fn decode(&mut self, packet: &[u8]) -> Sample {
        let counter = packet[1];

        // Track sequence for gap detection
        if let Some(last) = self.last_counter {
            if counter != last.wrapping_add(1) {
                self.gaps += 1;
                tracing::warn!(
                    "Sequence gap: expected {}, got {}",
                    last.wrapping_add(1),
                    counter
                );
            }
            self.sequence = self
                .sequence
                .wrapping_add(u32::from(counter.wrapping_sub(last)));
        }
        self.last_counter = Some(counter);

        let channels = (0..CHANNELS)
            .map(|ch| {
                let offset = 2 + ch * 3;
                let raw = f64::from(parse_24bit(&packet[offset..offset + 3]));
                self.scale.map_or(raw, |s| raw * s)
            })
            .collect();

        Sample::new(channels, self.sequence)
    }
}

/// Sign-extend a 24-bit big-endian value
fn parse_24bit(bytes: &[u8]) -> i32 {
    let raw = (i32::from(bytes[0]) << 16) | (i32::from(bytes[1]) << 8) | i32::from(bytes[2]);
    if raw & 0x80_0000 != 0 {
        raw | !0xFF_FFFF
    } else {
        raw
    }
}

/// Serial connection to a Cyton board
#[cfg(feature = "serial")]
pub struct CytonBridge {
    port: Box<dyn serialport::SerialPort>,
    port_name: String,
    parser: CytonParser,
    sample_rate_hz: f64,
}

#[cfg(feature = "serial")]
impl CytonBridge {
    /// Open a connection to the Cyton dongle
    ///
    /// # Arguments
    ///
    /// * `port_name` - Serial port name (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `baud_rate` - Baud rate (115200 for the stock firmware)
    /// * `sample_rate_hz` - Rate the board is configured for
    /// * `microvolts` - Scale ADC counts to µV
    ///
    /// # Errors
    ///
    /// Returns error if port cannot be opened
    pub fn open(port_name: &str, baud_rate: u32, sample_rate_hz: f64, microvolts: bool) -> BridgeResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        tracing::info!("Opened Cyton on {} at {} baud", port_name, baud_rate);

        Ok(Self {
            port,
            port_name: port_name.to_string(),
            parser: if microvolts { CytonParser::microvolts() } else { CytonParser::new() },
            sample_rate_hz,
        })
    }

    /// List available serial ports
    #[must_use]
    pub fn list_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }

    /// Send start streaming command
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    pub fn start_streaming(&mut self) -> BridgeResult<()> {
        self.send_command(START_STREAM)
    }

    /// Send stop streaming command
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    pub fn stop_streaming(&mut self) -> BridgeResult<()> {
        self.send_command(STOP_STREAM)
    }

    fn send_command(&mut self, command: u8) -> BridgeResult<()> {
        self.port.write_all(&[command])?;
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(feature = "serial")]
impl SampleSource for CytonBridge {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    fn stream(&mut self, sink: &mut dyn FnMut(Sample), shutdown: &Shutdown) -> BridgeResult<()> {
        self.start_streaming()?;

        let mut temp = [0u8; 256];
        let result = loop {
            if shutdown.is_requested() {
                break Ok(());
            }

            match self.port.read(&mut temp) {
                Ok(0) => continue,
                Ok(n) => self.parser.extend(&temp[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => break Err(e.into()),
            }

            while let Some(sample) = self.parser.next_sample() {
                sink(sample);
            }
        };

        if let Err(e) = self.stop_streaming() {
            tracing::warn!("Failed to stop Cyton stream: {}", e);
        }
        tracing::info!(
            "Cyton stream ended: {} sequence gaps, {} bytes dropped",
            self.parser.gaps(),
            self.parser.dropped_bytes()
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(counter: u8, values: [i32; CHANNELS]) -> Vec<u8> {
        let mut p = vec![HEADER_BYTE, counter];
        for v in values {
            let bytes = v.to_be_bytes();
            p.extend_from_slice(&bytes[1..4]);
        }
        p.extend_from_slice(&[0; 6]);
        p.push(0xC0);
        p
    }

    #[test]
    fn test_parse_24bit_sign_extension() {
        assert_eq!(parse_24bit(&[0x00, 0x00, 0x01]), 1);
        assert_eq!(parse_24bit(&[0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(parse_24bit(&[0x80, 0x00, 0x00]), -8_388_608);
        assert_eq!(parse_24bit(&[0x7F, 0xFF, 0xFF]), 8_388_607);
    }

    #[test]
    fn test_decode_single_packet() {
        let mut parser = CytonParser::new();
        parser.extend(&packet(0, [1, -1, 2, -2, 100, -100, 0, 8_388_607]));

        let sample = parser.next_sample().unwrap();
        assert_eq!(sample.channels, vec![1.0, -1.0, 2.0, -2.0, 100.0, -100.0, 0.0, 8_388_607.0]);
        assert!(parser.next_sample().is_none());
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut parser = CytonParser::new();
        parser.extend(&[0x01, 0x02, HEADER_BYTE, 0x05]);
        parser.extend(&packet(7, [3; CHANNELS]));

        let sample = parser.next_sample().unwrap();
        assert_eq!(sample.channels, vec![3.0; CHANNELS]);
        assert!(parser.dropped_bytes() >= 3);
    }

    #[test]
    fn test_partial_packet_waits_for_more_bytes() {
        let mut parser = CytonParser::new();
        let p = packet(1, [5; CHANNELS]);
        parser.extend(&p[..20]);
        assert!(parser.next_sample().is_none());
        parser.extend(&p[20..]);
        assert!(parser.next_sample().is_some());
    }

    #[test]
    fn test_sequence_gap_counted() {
        let mut parser = CytonParser::new();
        parser.extend(&packet(254, [0; CHANNELS]));
        parser.extend(&packet(255, [0; CHANNELS]));
        parser.extend(&packet(0, [0; CHANNELS]));
        parser.extend(&packet(3, [0; CHANNELS]));

        let sequences: Vec<u32> = std::iter::from_fn(|| parser.next_sample())
            .map(|s| s.sequence)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 5]);
        assert_eq!(parser.gaps(), 1);
    }

    #[test]
    fn test_microvolt_scaling() {
        let mut parser = CytonParser::microvolts();
        parser.extend(&packet(0, [8_388_607; CHANNELS]));
        let sample = parser.next_sample().unwrap();
        assert!((sample.channels[0] - 187_500.0).abs() < 1e-6);
    }
}
