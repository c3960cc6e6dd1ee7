//! ocr-consensus - Replay recorded preview frames through the recognition engine
//!
//! Frames are read from image files and paced at the configured frame rate.
//! OCR output is taken from a transcript file with one result per line, so
//! the consensus behaviour can be checked without a recognizer installed.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ocr_consensus::config::{self, AppConfig};
use ocr_consensus::{
    result_channel, CompletionPolicy, FrameOutcome, ImagePreprocessor, ImageSequence,
    RecognitionEngine, RecognitionReliability, Rect, Size, TranscriptOcr,
};

/// Real-time OCR with multi-frame agreement
#[derive(Parser, Debug)]
#[command(name = "ocr-consensus")]
#[command(about = "Replay preview frames through OCR and report values once consecutive reads agree")]
struct Args {
    /// Image files or directories of images, in capture order
    #[arg(long, required = true, num_args = 1..)]
    frames: Vec<PathBuf>,

    /// OCR transcript, one result per line (blank line = nothing read)
    #[arg(long)]
    transcript: PathBuf,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preview size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    preview: Option<Size>,

    /// Region of interest in preview coordinates as X,Y,WIDTH,HEIGHT
    #[arg(long, value_parser = parse_rect)]
    roi: Option<Rect>,

    /// Number of consecutive agreeing reads required
    #[arg(long, value_enum)]
    reliability: Option<RecognitionReliability>,

    /// Stop recognising after the first reported value
    #[arg(long)]
    stop_after_first: bool,

    /// Frame delivery rate
    #[arg(long)]
    fps: Option<u32>,

    /// Simulated OCR latency in milliseconds
    #[arg(long, default_value = "0")]
    latency_ms: u64,

    /// Print reported values as JSON lines
    #[arg(long)]
    json: bool,

    /// Log skipped and discarded frames
    #[arg(short, long)]
    verbose: bool,
}

/// One reported value
#[derive(Debug, Serialize)]
struct Report {
    index: usize,
    text: String,
    elapsed_ms: u128,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => load_or_default_config(),
    };
    apply_overrides(&mut config, &args);

    let ocr = TranscriptOcr::load(&args.transcript)?
        .with_latency(Duration::from_millis(args.latency_ms));
    let sequence = ImageSequence::from_paths(&args.frames)?;
    info!(
        "Replaying {} frames against {} transcript entries",
        sequence.len(),
        ocr.remaining()
    );

    let (callback, results) = result_channel(64);
    let preprocessor =
        ImagePreprocessor::new().with_controls(config.enhancement.color_controls());
    let engine = RecognitionEngine::builder(config.recognition.engine_options())
        .preprocessor(Arc::new(preprocessor))
        .on_result(callback)
        .build(Arc::new(ocr), Handle::current());
    engine
        .set_region_of_interest(config.capture.roi)
        .context("invalid region of interest")?;

    let preview = config.capture.preview;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(
        1.0 / f64::from(config.capture.max_fps.max(1)),
    ));
    let started = Instant::now();
    let mut stats = ReplayStats::default();

    for (path, frame) in sequence.frames() {
        ticker.tick().await;
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping {:?}: {:#}", path, e);
                continue;
            }
        };

        match engine.on_frame(frame, preview)? {
            FrameOutcome::Submitted => stats.submitted += 1,
            FrameOutcome::Skipped(reason) => {
                debug!("{:?} skipped: {:?}", path, reason);
                stats.skipped += 1;
            }
            FrameOutcome::Dropped(e) => {
                warn!("{:?} dropped: {}", path, e);
                stats.dropped += 1;
            }
        }

        for text in results.try_iter() {
            stats.report(text, started, args.json)?;
        }
        if config.recognition.completion_policy == CompletionPolicy::StopAfterFirst
            && stats.reported > 0
        {
            break;
        }
    }

    engine.wait_idle().await;
    for text in results.try_iter() {
        stats.report(text, started, args.json)?;
    }

    info!(
        "Done: {} submitted, {} skipped, {} dropped, {} reported",
        stats.submitted, stats.skipped, stats.dropped, stats.reported
    );

    Ok(())
}

#[derive(Debug, Default)]
struct ReplayStats {
    submitted: usize,
    skipped: usize,
    dropped: usize,
    reported: usize,
}

impl ReplayStats {
    fn report(&mut self, text: String, started: Instant, json: bool) -> Result<()> {
        self.reported += 1;
        if json {
            let report = Report {
                index: self.reported,
                text,
                elapsed_ms: started.elapsed().as_millis(),
            };
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", text);
        }
        Ok(())
    }
}

/// Load configuration from the user config directory or fall back to defaults
fn load_or_default_config() -> AppConfig {
    if let Ok(config_path) = config::default_config_path() {
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return config;
                }
                Err(e) => warn!("Ignoring {:?}: {:#}", config_path, e),
            }
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(preview) = args.preview {
        config.capture.preview = preview;
    }
    if let Some(roi) = args.roi {
        config.capture.roi = Some(roi);
    }
    if let Some(reliability) = args.reliability {
        config.recognition.reliability = reliability;
    }
    if args.stop_after_first {
        config.recognition.completion_policy = CompletionPolicy::StopAfterFirst;
    }
    if let Some(fps) = args.fps {
        config.capture.max_fps = fps;
    }
}

fn parse_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
    let width = w.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let height = h.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok(Size::new(width, height))
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(Rect::new(*x, *y, *width, *height)),
        _ => Err(format!("expected X,Y,WIDTH,HEIGHT, got {:?}", s)),
    }
}
