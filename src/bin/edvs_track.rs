//! edvs-track: run blink detectors and the rolling PCA tracker over events
//! read from stdin, writing one JSON report per batch to stdout.

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use edvs_tracking::config::{DetectorSpec, PcaTrackerConfig, SliceConfig, TrackingConfig};
use edvs_tracking::event::Event;
use edvs_tracking::frequency::FrequencyDetector;
use edvs_tracking::pca::{PcaResult, RollingPcaTracker};
use edvs_tracking::slicer::{EventSlicer, SliceMode};

/// Reads tab-separated events (x y timestamp polarity) from stdin, slices
/// them into batches and reports blinking pixels and the PCA of recent
/// activity for each batch.
#[derive(Parser, Debug)]
#[command(name = "edvs-track", version)]
struct Cli {
    /// JSON tracking configuration; the flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sensor width (default: 128)
    #[arg(long)]
    width: Option<u32>,

    /// Sensor height (default: 128)
    #[arg(long)]
    height: Option<u32>,

    /// Comma-separated target frequencies in Hz, one detector each
    #[arg(long, value_delimiter = ',')]
    targets: Option<Vec<f64>>,

    /// Tolerance as a fraction of each target frequency
    #[arg(long, default_value_t = 0.1)]
    tolerance_ratio: f64,

    /// Consecutive matching cycles needed to confirm a detection
    #[arg(long, default_value_t = 3)]
    required_matches: u32,

    /// Rolling PCA window size in events
    #[arg(long)]
    window_size: Option<usize>,

    /// Disable the PCA tracker
    #[arg(long)]
    no_pca: bool,

    /// Slice every N microseconds
    #[arg(long, conflicts_with = "slice_count")]
    slice_us: Option<i64>,

    /// Slice every N events
    #[arg(long)]
    slice_count: Option<i64>,

    /// Include detected pixel coordinates in each report
    #[arg(long)]
    list_pixels: bool,
}

impl Cli {
    fn tracking_config(&self) -> anyhow::Result<TrackingConfig> {
        let mut config = match &self.config {
            Some(path) => TrackingConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TrackingConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(targets) = &self.targets {
            config.detectors = targets
                .iter()
                .map(|&hz| DetectorSpec::new(hz, hz * self.tolerance_ratio, self.required_matches))
                .collect();
        }
        if let Some(window) = self.window_size {
            config.pca = Some(PcaTrackerConfig::new(window));
        }
        if self.no_pca {
            config.pca = None;
        }
        if let Some(us) = self.slice_us {
            config.slice = SliceConfig {
                mode: SliceMode::ByTime,
                threshold: us,
            };
        }
        if let Some(count) = self.slice_count {
            config.slice = SliceConfig {
                mode: SliceMode::ByCount,
                threshold: count,
            };
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct DetectionReport {
    target_hz: f64,
    detected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pixels: Option<Vec<(i16, i16)>>,
}

#[derive(Serialize)]
struct PcaReport {
    window: usize,
    meaningful: bool,
    #[serde(flatten)]
    result: PcaResult,
    axis_endpoints: [[f64; 2]; 2],
}

#[derive(Serialize)]
struct BatchReport {
    batch: u64,
    events: usize,
    end_timestamp: i64,
    detections: Vec<DetectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pca: Option<PcaReport>,
}

struct Pipeline {
    detectors: Vec<FrequencyDetector>,
    tracker: Option<RollingPcaTracker>,
    list_pixels: bool,
    batches: u64,
}

impl Pipeline {
    fn new(config: &TrackingConfig, list_pixels: bool) -> anyhow::Result<Self> {
        let detectors = config
            .detector_configs()
            .map(|c| FrequencyDetector::new(&c))
            .collect::<Result<Vec<_>, _>>()?;
        let tracker = config
            .pca
            .as_ref()
            .map(RollingPcaTracker::new)
            .transpose()?;
        Ok(Self {
            detectors,
            tracker,
            list_pixels,
            batches: 0,
        })
    }

    fn process(&mut self, events: &[Event]) -> BatchReport {
        self.batches += 1;

        let detections = self
            .detectors
            .iter_mut()
            .map(|det| {
                det.accept_batch(events);
                DetectionReport {
                    target_hz: det.target_frequency_hz(),
                    detected: det.detected_count(),
                    pixels: self.list_pixels.then(|| det.detected_pixels().collect()),
                }
            })
            .collect();

        let pca = self.tracker.as_mut().map(|tracker| {
            tracker.accept_batch(events);
            PcaReport {
                window: tracker.window_len(),
                meaningful: tracker.is_meaningful(),
                result: tracker.result(),
                axis_endpoints: tracker.axis_endpoints(),
            }
        });

        BatchReport {
            batch: self.batches,
            events: events.len(),
            end_timestamp: events.last().map_or(0, |e| e.timestamp),
            detections,
            pca,
        }
    }
}

fn emit(out: &mut impl Write, report: &BatchReport) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edvs_tracking=info,edvs_track=info".into()),
        )
        .init();

    let config = cli.tracking_config()?;
    info!(
        width = config.width,
        height = config.height,
        detectors = config.detectors.len(),
        pca = config.pca.is_some(),
        mode = ?config.slice.mode,
        threshold = config.slice.threshold,
        "edvs-track starting"
    );

    let mut pipeline = Pipeline::new(&config, cli.list_pixels)?;
    let mut slicer = EventSlicer::new(config.slice.mode, config.slice.threshold);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut total: u64 = 0;
    let mut skipped: u64 = 0;

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: Event = match line.parse() {
            Ok(ev) => ev,
            Err(err) => {
                warn!("{}", err);
                skipped += 1;
                continue;
            }
        };
        total += 1;

        if let Some(batch) = slicer.push(event) {
            emit(&mut out, &pipeline.process(&batch))?;
        }
    }

    if let Some(batch) = slicer.flush() {
        emit(&mut out, &pipeline.process(&batch))?;
    }
    out.flush()?;

    info!(
        events = total,
        skipped,
        batches = pipeline.batches,
        "edvs-track finished"
    );
    Ok(())
}
