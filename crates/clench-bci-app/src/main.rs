//! Clench BCI Application
//!
//! Streams EMG from an OpenBCI Cyton (or a simulator), toggles an actuator on
//! every detected jaw clench, records operator markers, and trains an epoch
//! classifier on the labelled recording when the session ends.
//!
//! # Usage
//!
//! ```bash
//! # Stream from a Cyton, toggle an actuator, label with keys 0-3, quit with q
//! clench stream --port /dev/ttyUSB0 --actuator /dev/ttyACM0 --model-out model.json
//!
//! # Same session against the simulator
//! clench stream --simulate
//!
//! # Unattended demo: simulator plus a scripted marker sequence
//! clench demo --epochs-per-label 3 --rounds 2
//!
//! # List serial ports
//! clench ports
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use clench_bci_core::segment::segment_all;
use clench_bci_core::stream::StreamLog;
use clench_bci_core::types::FrequencyBand;
use clench_bci_native::bridge::{
    Actuator, BridgeError, NullActuator, SampleSource, Shutdown, SimulatedSource, SimulationConfig,
};
use clench_bci_native::config::SessionConfig;
use clench_bci_native::ml::{ClassificationPipeline, TrainingMetrics};
use clench_bci_native::session::{KeyInput, MarkerListener, MarkerStore, ScriptedKeys, StreamSession};

/// Clench BCI Application
#[derive(Parser, Debug)]
#[command(name = "clench")]
#[command(author, version, about = "EMG clench detection and marker-labelled epoch classification", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON session config; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream, detect clenches, record markers from the keyboard, then train
    Stream {
        /// Cyton serial port (e.g., /dev/ttyUSB0 or COM3)
        #[arg(short, long)]
        port: Option<String>,

        /// Use the simulator even if a port is configured
        #[arg(long)]
        simulate: bool,

        /// Actuator serial port
        #[arg(short, long)]
        actuator: Option<String>,

        /// Scale Cyton counts to microvolts
        #[arg(long)]
        microvolts: bool,

        #[command(flatten)]
        training: TrainingArgs,
    },

    /// Simulated session driven by a scripted marker sequence
    Demo {
        /// Seconds each label is held [default: one epoch more than --epochs-per-label]
        #[arg(long)]
        dwell_secs: Option<f64>,

        /// Whole epochs to collect per label on each pass
        #[arg(long, default_value = "3")]
        epochs_per_label: usize,

        /// Passes over the label set
        #[arg(long, default_value = "2")]
        rounds: usize,

        #[command(flatten)]
        training: TrainingArgs,
    },

    /// List available serial ports
    Ports,
}

#[derive(clap::Args, Debug)]
struct TrainingArgs {
    /// Samples per epoch
    #[arg(long)]
    epoch_length: Option<usize>,

    /// Write the trained model here
    #[arg(long)]
    model_out: Option<PathBuf>,

    /// Write training metrics here as JSON
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Clench BCI v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Stream {
            port,
            simulate,
            actuator,
            microvolts,
            training,
        } => {
            if port.is_some() {
                config.device_port = port;
            }
            if simulate {
                config.device_port = None;
            }
            if actuator.is_some() {
                config.actuator_port = actuator;
            }
            config.scale_to_uv |= microvolts;
            training.apply(&mut config);
            config.validate()?;
            run_stream(&config, &training)
        }
        Commands::Demo {
            dwell_secs,
            epochs_per_label,
            rounds,
            training,
        } => {
            config.device_port = None;
            training.apply(&mut config);
            config.validate()?;
            let dwell = match dwell_secs {
                Some(secs) => Duration::try_from_secs_f64(secs).context("--dwell-secs must be a non-negative number")?,
                None => demo_dwell(&config, epochs_per_label),
            };
            run_demo(&config, dwell, rounds, &training)
        }
        Commands::Ports => {
            list_ports();
            Ok(())
        }
    }
}

impl TrainingArgs {
    fn apply(&self, config: &mut SessionConfig) {
        if let Some(len) = self.epoch_length {
            config.segment.epoch_length = len;
        }
    }
}

/// Keyboard-labelled session
fn run_stream(config: &SessionConfig, training: &TrainingArgs) -> anyhow::Result<()> {
    let markers = MarkerStore::new();
    let source = open_source(config, &markers)?;
    let keys = open_keyboard()?;
    info!("Keys 1-3 set the marker, 0 clears it, q ends the session");
    let recording = capture(config, source, markers, keys)?;
    train_recording(config, recording, training)
}

/// Simulated session with scripted markers
fn run_demo(config: &SessionConfig, dwell: Duration, rounds: usize, training: &TrainingArgs) -> anyhow::Result<()> {
    let epoch_secs = config.segment.epoch_length as f64 / config.sample_rate_hz;
    if dwell.as_secs_f64() < 2.0 * epoch_secs {
        warn!(
            "Dwell of {:.1}s is under two epochs ({:.1}s each); marker changes may leave no whole epochs",
            dwell.as_secs_f64(),
            epoch_secs
        );
    }

    let markers = MarkerStore::new();
    // Label the very first sample so the first dwell is not cut short
    if let Some(first) = config.segment.labels.iter().next() {
        markers.set(first);
    }
    let source = open_source(config, &markers)?;
    let keys = ScriptedKeys::cycle(config.segment.labels, dwell, rounds);
    info!(
        "Demo holds each label for {:.1}s and runs for {:.0}s",
        dwell.as_secs_f64(),
        keys.duration().as_secs_f64()
    );
    let recording = capture(config, source, markers, Box::new(keys))?;
    train_recording(config, recording, training)
}

/// Hold time giving `epochs` whole epochs per label.
///
/// Marker changes come from a wall-clock script and never line up with the
/// epoch grid, so one extra epoch absorbs the misalignment.
fn demo_dwell(config: &SessionConfig, epochs: usize) -> Duration {
    let epoch_secs = config.segment.epoch_length as f64 / config.sample_rate_hz;
    Duration::from_secs_f64(epoch_secs * (epochs.max(1) + 1) as f64)
}

#[cfg(feature = "keyboard")]
fn open_keyboard() -> anyhow::Result<Box<dyn KeyInput>> {
    let keys = clench_bci_native::session::TerminalKeys::new().context("cannot read the keyboard")?;
    Ok(Box::new(keys))
}

#[cfg(not(feature = "keyboard"))]
fn open_keyboard() -> anyhow::Result<Box<dyn KeyInput>> {
    anyhow::bail!(
        "Keyboard markers not enabled. Rebuild with --features keyboard, or run `clench demo`"
    )
}

/// Labelled samples from one session, plus the transport error that ended
/// it early, if any
struct Recording {
    log: StreamLog,
    stream_error: Option<BridgeError>,
}

/// Stream until quit, returning the labelled recording
fn capture(
    config: &SessionConfig,
    mut source: Box<dyn SampleSource>,
    markers: MarkerStore,
    keys: Box<dyn KeyInput>,
) -> anyhow::Result<Recording> {
    let shutdown = Shutdown::new();

    // Open the actuator before starting the listener so startup failures are clean
    let actuator = open_actuator(config)?;
    let mut session = StreamSession::new(config.detector.clone(), markers.clone(), actuator)?;

    info!(
        "Streaming from {} at {} Hz",
        source.name(),
        source.sample_rate_hz()
    );

    let listener = MarkerListener::new(markers, shutdown.clone(), config.debounce()).spawn(keys);

    let result = source.stream(
        &mut |sample| {
            session.on_sample(sample);
        },
        &shutdown,
    );

    shutdown.request();
    match listener.join() {
        Ok(stats) => info!(
            "Marker listener: {} changes accepted, {} debounced",
            stats.accepted, stats.debounced
        ),
        Err(_) => warn!("Marker listener panicked"),
    }

    let (log, stats) = session.finish();
    let stream_error = result.err();
    if let Some(e) = &stream_error {
        error!("Streaming stopped early: {e}; keeping {} recorded samples", log.len());
    }
    let histogram = log.marker_histogram();
    info!(
        "Session ended: {} samples, {} clenches, {} actuator failures, {} sequence gaps, {} rejected",
        stats.samples, stats.clench_events, stats.actuator_failures, stats.sequence_gaps, stats.rejected_samples
    );
    info!(
        "Samples per marker: 0={} 1={} 2={} 3={}",
        histogram[0], histogram[1], histogram[2], histogram[3]
    );
    Ok(Recording { log, stream_error })
}

/// Train on whatever was recorded, then report a transport failure
fn train_recording(config: &SessionConfig, recording: Recording, training: &TrainingArgs) -> anyhow::Result<()> {
    train(config, &recording.log, training)?;
    match recording.stream_error {
        Some(e) => Err(anyhow::Error::new(e).context("streaming stopped with an error")),
        None => Ok(()),
    }
}

fn open_source(config: &SessionConfig, markers: &MarkerStore) -> anyhow::Result<Box<dyn SampleSource>> {
    if let Some(port) = &config.device_port {
        return open_cyton(config, port);
    }

    let sim = SimulationConfig {
        sample_rate_hz: config.sample_rate_hz,
        channel_count: config.channel_count,
        ..SimulationConfig::default()
    };
    Ok(Box::new(SimulatedSource::new(sim)?.with_markers(markers.clone())))
}

#[cfg(feature = "serial")]
fn open_cyton(config: &SessionConfig, port: &str) -> anyhow::Result<Box<dyn SampleSource>> {
    let bridge = clench_bci_native::bridge::CytonBridge::open(
        port,
        config.device_baud,
        config.sample_rate_hz,
        config.scale_to_uv,
    )
    .with_context(|| format!("cannot open Cyton on {port}"))?;
    Ok(Box::new(bridge))
}

#[cfg(not(feature = "serial"))]
fn open_cyton(_config: &SessionConfig, port: &str) -> anyhow::Result<Box<dyn SampleSource>> {
    anyhow::bail!("Serial support not enabled; cannot open {port}. Rebuild with --features serial")
}

#[cfg(feature = "serial")]
fn open_actuator(config: &SessionConfig) -> anyhow::Result<Box<dyn Actuator>> {
    match &config.actuator_port {
        Some(port) => {
            let actuator =
                clench_bci_native::bridge::SerialActuator::open(port, config.actuator_baud, config.actuator_settle())
                    .with_context(|| format!("cannot open actuator on {port}"))?;
            Ok(Box::new(actuator))
        }
        None => Ok(Box::new(NullActuator::new())),
    }
}

#[cfg(not(feature = "serial"))]
fn open_actuator(config: &SessionConfig) -> anyhow::Result<Box<dyn Actuator>> {
    if let Some(port) = &config.actuator_port {
        anyhow::bail!("Serial support not enabled; cannot open actuator on {port}");
    }
    Ok(Box::new(NullActuator::new()))
}

/// Segment the recording and fit the classifier
fn train(config: &SessionConfig, log: &StreamLog, training: &TrainingArgs) -> anyhow::Result<()> {
    let (epochs, summary) = segment_all(log, &config.segment)?;
    info!(
        "Segmented {} epochs of {} samples ({} windows discarded, {} trailing samples dropped)",
        summary.emitted, config.segment.epoch_length, summary.discarded, summary.trailing
    );
    for marker in config.segment.labels.iter() {
        info!("  marker {marker}: {} epochs", summary.per_label[usize::from(marker.value())]);
    }

    if epochs.is_empty() {
        warn!("No epochs; skipping training");
        return Ok(());
    }

    let pipeline = ClassificationPipeline::new(config.pipeline_config())?;
    let (model, metrics) = pipeline.fit(&epochs).context("training failed")?;

    print_metrics(&metrics, &config.pipeline.bands);

    if let Some(path) = &training.model_out {
        model.save(path)?;
    }
    if let Some(path) = &training.metrics_out {
        write_metrics(path, &metrics)?;
    }
    Ok(())
}

fn print_metrics(metrics: &TrainingMetrics, bands: &[FrequencyBand]) {
    println!();
    println!(
        "Train accuracy: {:.3}   Test accuracy: {:.3}   ({} train / {} test epochs)",
        metrics.train_accuracy, metrics.test_accuracy, metrics.train_size, metrics.test_size
    );
    println!();
    println!("{}", metrics.report);

    println!("Mean relative band power per class ({}):", band_header(bands));
    for (marker, powers) in &metrics.class_band_power {
        let cells: Vec<String> = powers.iter().map(|p| format!("{p:.3}")).collect();
        println!("  marker {marker}: {}", cells.join(" "));
    }

    let mut ranked: Vec<(usize, f64)> = metrics.feature_relevance.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!();
    println!("Most informative CSP features (mutual information, nats):");
    for (i, mi) in ranked.iter().take(5) {
        println!("  feature {i:>3}: {mi:.3}");
    }
}

fn band_header(bands: &[FrequencyBand]) -> String {
    bands.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn write_metrics(path: &Path, metrics: &TrainingMetrics) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(metrics)?;
    std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
    info!("Wrote metrics to {}", path.display());
    Ok(())
}

/// List available serial ports
fn list_ports() {
    #[cfg(feature = "serial")]
    {
        let ports = clench_bci_native::bridge::CytonBridge::list_ports();
        if ports.is_empty() {
            info!("No serial ports found");
        }
        for port in ports {
            println!("{port}");
        }
    }

    #[cfg(not(feature = "serial"))]
    warn!("Serial support not enabled. Rebuild with --features serial");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clench_bci_core::types::Sample;

    fn training_args() -> TrainingArgs {
        TrainingArgs {
            epoch_length: None,
            model_out: None,
            metrics_out: None,
        }
    }

    /// Delivers `samples` samples, then reports a disconnect
    struct DroppingSource {
        samples: usize,
    }

    impl SampleSource for DroppingSource {
        fn name(&self) -> &str {
            "dropping"
        }

        fn sample_rate_hz(&self) -> f64 {
            125.0
        }

        fn stream(&mut self, sink: &mut dyn FnMut(Sample), _shutdown: &Shutdown) -> Result<(), BridgeError> {
            for i in 0..self.samples {
                sink(Sample::uniform(4, 10.0, (i % 256) as u32));
            }
            Err(BridgeError::Disconnected {
                reason: "cable pulled".to_string(),
            })
        }
    }

    #[test]
    fn test_demo_dwell_adds_one_epoch_of_margin() {
        let config = SessionConfig::default();
        // 1000 samples at 125 Hz is 8 s per epoch
        assert_eq!(demo_dwell(&config, 3), Duration::from_secs(32));
        assert_eq!(demo_dwell(&config, 0), Duration::from_secs(16));
    }

    #[test]
    fn test_demo_collects_epochs_for_every_label() {
        let mut config = SessionConfig {
            sample_rate_hz: 1000.0,
            channel_count: 4,
            debounce_ms: 50,
            ..SessionConfig::default()
        };
        config.segment.epoch_length = 100;
        config.detector.window_len = 1000;

        let markers = MarkerStore::new();
        markers.set(config.segment.labels.iter().next().unwrap());
        let source = open_source(&config, &markers).unwrap();
        let keys = ScriptedKeys::cycle(config.segment.labels, demo_dwell(&config, 3), 1);

        let recording = capture(&config, source, markers, Box::new(keys)).unwrap();
        assert!(recording.stream_error.is_none());

        let (epochs, summary) = segment_all(&recording.log, &config.segment).unwrap();
        assert!(!epochs.is_empty());
        for marker in config.segment.labels.iter() {
            assert!(
                summary.per_label[usize::from(marker.value())] >= 1,
                "no epochs for marker {marker}: {summary:?}"
            );
        }
    }

    #[test]
    fn test_transport_error_keeps_recording() {
        let config = SessionConfig::default();
        let source = Box::new(DroppingSource { samples: 50 });
        let keys = Box::new(ScriptedKeys::new(Vec::new()));

        let recording = capture(&config, source, MarkerStore::new(), keys).unwrap();
        assert_eq!(recording.log.len(), 50);
        assert!(matches!(recording.stream_error, Some(BridgeError::Disconnected { .. })));

        // Too short to segment: training is skipped and the transport error surfaces
        let result = train_recording(&config, recording, &training_args());
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("cable pulled"), "{message}");
    }

    #[test]
    fn test_band_header_follows_configured_bands() {
        assert_eq!(
            band_header(&[FrequencyBand::Alpha, FrequencyBand::Beta]),
            format!("{} {}", FrequencyBand::Alpha, FrequencyBand::Beta)
        );
        assert_eq!(band_header(&FrequencyBand::ALL).split(' ').count(), 5);
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn test_device_port_needs_serial_support() {
        let config = SessionConfig {
            device_port: Some("/dev/ttyUSB0".to_string()),
            ..SessionConfig::default()
        };
        let err = open_source(&config, &MarkerStore::new()).err().unwrap();
        assert!(err.to_string().contains("Serial support not enabled"));
    }

    #[cfg(not(feature = "keyboard"))]
    #[test]
    fn test_keyboard_needs_feature() {
        assert!(open_keyboard().is_err());
    }
}
