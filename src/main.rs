// GestureGate - Gateway Entry Point
//
// Boot sequence:
//   1. Load configuration (defaults, optional TOML file, command-line flags).
//   2. Start and initialise the classifier. Failure here is fatal.
//   3. Build the sequence validator and the device commander.
//   4. Spawn the reader and AI tasks.
//   5. Run the acquisition loop on the main thread until Ctrl-C.
//
// Serial link problems are never fatal: the reader keeps retrying and
// commands are dropped while the link is down.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use crossbeam_channel::{bounded, tick, unbounded};

use gesturegate::classify::ClassificationAdapter;
use gesturegate::config::Config;
use gesturegate::drivers::feedback::DeviceCommander;
use gesturegate::drivers::serial::SerialLink;
use gesturegate::ei;
use gesturegate::ingest::{SampleBuffer, SampleIngestor};
use gesturegate::scheduler::{InFlightSlot, WindowScheduler};
use gesturegate::sequence::SequenceValidator;
use gesturegate::tasks;
use gesturegate::tasks::acquisition::Acquisition;
use gesturegate::tasks::ai::FeedbackPipeline;

#[derive(Parser, Debug)]
#[command(name = "gesturegate", version, about = "Serial IMU gesture sequence gateway")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device path
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Classification window period in milliseconds
    #[arg(long = "window-ms")]
    window_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("GestureGate starting...");

    // ---- Configuration ----------------------------------------------------
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.serial.port = port;
    }
    if let Some(baud) = args.baud {
        config.serial.baud = baud;
    }
    if let Some(period) = args.window_ms {
        config.window.period_ms = period;
    }
    config.validate().context("invalid configuration")?;

    log::info!(
        "Port {} @ {} baud, window {} ms, sequence {:?} (on mismatch: {:?})",
        config.serial.port,
        config.serial.baud,
        config.window.period_ms,
        config.sequence.labels,
        config.sequence.on_mismatch
    );

    // ---- Classifier -------------------------------------------------------
    let classifier = ei::open_backend(&config.classifier)
        .with_context(|| format!("failed to start {:?} classifier", config.classifier.backend))?;
    let adapter = ClassificationAdapter::new(classifier).context("classifier did not initialise")?;
    let props = adapter.properties()?;
    log::info!(
        "Classifier ready: {:?}, {} labels, output {:?}",
        props.model_type,
        props.labels.len(),
        adapter.shape()
    );

    // ---- Sequence + device feedback ---------------------------------------
    let validator = SequenceValidator::new(
        config.sequence.labels.clone(),
        config.sequence.on_mismatch,
        config.sequence.unknown_label.clone(),
    )
    .ok_or_else(|| anyhow!("gesture sequence is empty"))?;

    let link = SerialLink::new(config.serial.clone());
    let commander = DeviceCommander::new(link.clone(), &config.device);
    let pipeline = FeedbackPipeline::new(adapter, validator, commander);

    // ---- Channels ---------------------------------------------------------
    let (event_tx, event_rx) = unbounded();
    let (window_tx, window_rx) = bounded(1);
    let (shutdown_tx, shutdown_rx) = bounded(1);

    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to install Ctrl-C handler")?;

    // ---- Spawn tasks ------------------------------------------------------
    let reader_link = link.clone();
    thread::Builder::new()
        .name("reader".into())
        .spawn(move || {
            tasks::reader::reader_task(reader_link, event_tx);
        })?;

    let ai = thread::Builder::new()
        .name("ai".into())
        .spawn(move || tasks::ai::ai_task(window_rx, pipeline))?;

    // ---- Acquisition loop (main thread) -----------------------------------
    let buffer = SampleBuffer::new();
    let scheduler = WindowScheduler::new(buffer.clone(), InFlightSlot::new(), window_tx);
    let acquisition = Acquisition::new(
        SampleIngestor::new(buffer),
        scheduler,
        &config.device.ack_prefix,
    );
    let ticker = tick(Duration::from_millis(config.window.period_ms));

    let stats = acquisition.run(event_rx, ticker, shutdown_rx);

    // The scheduler (and its window sender) is gone now, so the AI task
    // finishes the window it holds and returns.
    match ai.join() {
        Ok(pipeline) => log::info!(
            "Commands sent {}, dropped {}; classification failures {}; completed cycles {}",
            pipeline.commander().sent(),
            pipeline.commander().dropped(),
            pipeline.failures(),
            pipeline.validator().completed_cycles()
        ),
        Err(_) => log::error!("AI task panicked"),
    }
    link.close();

    log::info!(
        "Stopped: {} samples accepted, {} rejected, {} windows, {} ticks skipped",
        stats.accepted,
        stats.rejected,
        stats.windows,
        stats.skipped
    );
    Ok(())
}
