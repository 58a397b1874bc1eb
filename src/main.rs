mod descriptors;
mod host;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::File;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uvc_inmem_lib::{FrameTable, SimTransport, StreamConfig, UsbSpeed, UsbTransport, UvcDevice};

use host::{HostOptions, SimHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Speed {
    Full,
    High,
    Super,
}

impl From<Speed> for UsbSpeed {
    fn from(speed: Speed) -> Self {
        match speed {
            Speed::Full => UsbSpeed::Full,
            Speed::High => UsbSpeed::High,
            Speed::Super => UsbSpeed::Super,
        }
    }
}

/// Streams stored video frames as a UVC bulk camera over a simulated USB link.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory of frame files (e.g. MJPEG), streamed in file-name order.
    #[arg(short, long)]
    frames: Option<PathBuf>,
    /// Frame lengths of the synthetic stream used when no directory is given.
    #[arg(long, value_delimiter = ',', default_values_t = [9000u32, 100, 153600])]
    synthetic: Vec<u32>,
    /// JSON file overriding the stream configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Bus speed the simulated link enumerates at.
    #[arg(short, long, value_enum, default_value_t = Speed::Super)]
    speed: Speed,
    /// Frames the host receives before disconnecting.
    #[arg(short = 'n', long, default_value_t = 30)]
    frame_count: usize,
    /// Directory to write the reassembled frames to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Force the link into U1 while streaming.
    #[arg(long)]
    low_power: bool,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_ids(false);

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v, TRACE with -vv; RUST_LOG still wins
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

/// Frames bracketed by JPEG SOI/EOI markers with a counting fill, so
/// reassembly errors show up as corrupt images.
fn synthetic_frames(lengths: &[u32]) -> Result<FrameTable> {
    let frames = lengths.iter().enumerate().map(|(index, &len)| {
        let mut frame: Vec<u8> = (0..len as usize).map(|i| (i + index) as u8).collect();
        if frame.len() >= 4 {
            frame[..2].copy_from_slice(&[0xFF, 0xD8]);
            let end = frame.len();
            frame[end - 2..].copy_from_slice(&[0xFF, 0xD9]);
        }
        frame
    });
    FrameTable::from_frames(frames).context("Failed to build synthetic frames")
}

fn load_frames(cli: &Cli) -> Result<FrameTable> {
    match &cli.frames {
        Some(dir) => FrameTable::from_dir(dir).with_context(|| format!("Failed to load frames from {:?}", dir)),
        None => synthetic_frames(&cli.synthetic),
    }
}

fn load_config(cli: &Cli) -> Result<StreamConfig> {
    match &cli.config {
        Some(path) => {
            StreamConfig::from_json_file(path).with_context(|| format!("Failed to load stream config from {:?}", path))
        }
        None => Ok(StreamConfig::default()),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let frames = load_frames(&cli)?;
    info!(
        "{} frames, {} bytes, {} x {} byte buffers",
        frames.len(),
        frames.total_bytes(),
        config.buffer_count,
        config.buffer_size
    );

    let sim = Arc::new(SimTransport::new(cli.speed.into()));
    let transport: Arc<dyn UsbTransport> = sim.clone();
    let device = Arc::new(UvcDevice::new(transport, frames, config).context("Failed to create UVC device")?);
    device
        .init(&descriptors::DESCRIPTORS)
        .context("Failed to initialize UVC device")?;
    let streamer = device.spawn_streaming();

    let options = HostOptions {
        frame_count: cli.frame_count,
        output_dir: cli.output_dir.clone(),
        enter_low_power: cli.low_power,
    };
    let result = SimHost::new(sim.clone(), device.clone()).run(&options).await;
    streamer.abort();

    let report = result?;
    info!(
        "Host received {} frames in {} transfers ({} bytes) in {:.3?}, {:.1} fps, {} dropped",
        report.frames,
        report.transfers,
        report.bytes,
        report.elapsed,
        report.frames_per_second(),
        report.dropped_frames
    );
    info!("Device: {}", device.stats());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    tokio::select! {
        res = run(cli) => {
            if let Err(e) = res {
                error!("Streaming failed: {:?}", e);
                process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down gracefully.");
        }
    }
    Ok(())
}
