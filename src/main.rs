use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use vslam_pilot::control::VelocityCommander;
use vslam_pilot::flight::{FlightSequencer, OpenDjiLink, VehicleTransport};
use vslam_pilot::io::{
    Calibration, CaptureSource, FrameSource, ImageSequenceSource, Rescaled, TrajectoryLog,
};
use vslam_pilot::localization::{LandmarkMap, MapLocalizer};
use vslam_pilot::system::{
    ControlLoopDriver, LoopConfig, PilotConfig, cancel_channel, spawn_key_watcher,
};
use vslam_pilot::viz::{OverlayConfig, OverlayWindow, RerunPlotter};

#[derive(Parser)]
#[command(name = "vslam-pilot")]
#[command(about = "Hold a drone at a visual map's origin using bounded velocity corrections")]
#[command(version)]
struct Cli {
    /// YAML run configuration. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bridge host, camera index, video file/URL or image directory.
    #[arg(long)]
    video_source: Option<String>,

    /// Open the video source directly instead of the bridge's video stream.
    #[arg(long)]
    no_drone_camera: bool,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Minimum time between iteration starts.
    #[arg(long)]
    min_interval_ms: Option<u64>,

    /// Per-axis velocity bound.
    #[arg(long)]
    bound: Option<f64>,

    /// Keep ascent at zero.
    #[arg(long)]
    lock_ascent: bool,

    /// Resize factor applied before localization.
    #[arg(long)]
    frame_scale: Option<f64>,

    /// Show the preview window.
    #[arg(long)]
    display: bool,

    #[arg(long)]
    display_scale: Option<f64>,

    #[arg(long)]
    mirror: bool,

    #[arg(long)]
    quit_key: Option<char>,

    /// Compute commands without flying.
    #[arg(long)]
    dry_run: bool,

    /// Stream pose and command plots to a rerun viewer.
    #[arg(long)]
    plot: bool,

    #[arg(long)]
    calibration: Option<PathBuf>,

    #[arg(long)]
    map: Option<PathBuf>,

    /// Write one CSV row per iteration.
    #[arg(long)]
    trajectory_csv: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut PilotConfig) {
        if let Some(source) = &self.video_source {
            config.video_source = source.clone();
        }
        if self.no_drone_camera {
            config.drone_camera = false;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(ms) = self.min_interval_ms {
            config.min_interval_ms = ms;
        }
        if let Some(bound) = self.bound {
            config.commander.bound = bound;
        }
        if self.lock_ascent {
            config.commander.lock_ascent = true;
        }
        if let Some(scale) = self.frame_scale {
            config.frame_scale = scale;
        }
        if self.display {
            config.display = true;
        }
        if let Some(scale) = self.display_scale {
            config.display_scale = scale;
        }
        if self.mirror {
            config.mirror_display = true;
        }
        if let Some(key) = self.quit_key {
            config.quit_key = key;
        }
        if self.dry_run {
            config.control = false;
        }
        if self.plot {
            config.plot = true;
        }
        if let Some(path) = &self.calibration {
            config.calibration_path = path.clone();
        }
        if let Some(path) = &self.map {
            config.map_path = path.clone();
        }
        if let Some(path) = &self.trajectory_csv {
            config.trajectory_csv = Some(path.clone());
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PilotConfig::load(path)?,
        None => PilotConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let calibration = Calibration::load(&config.calibration_path)?.scaled(config.frame_scale);
    let map = LandmarkMap::load(&config.map_path)?;
    info!("Loaded map with {} landmarks", map.len());
    let localizer = MapLocalizer::new(map, &calibration, config.localizer.clone())?;
    let commander = VelocityCommander::new(config.commander.clone())?;

    let frames = Rescaled::new(open_frames(&config)?, config.frame_scale);

    let sequencer = if config.control {
        let link = OpenDjiLink::connect(&config.video_source, &config.link)
            .with_context(|| format!("Failed to reach the bridge at {}", config.video_source))?;
        let transport: Box<dyn VehicleTransport> = Box::new(link);
        Some(FlightSequencer::new(transport, config.sequencer.clone()))
    } else {
        None
    };

    let (cancel, signal) = cancel_channel();
    spawn_key_watcher(config.quit_key, cancel.clone());
    info!("Type '{}' and Enter to stop", config.quit_key);

    let mut driver = ControlLoopDriver::new(
        frames,
        localizer,
        commander,
        sequencer,
        signal,
        LoopConfig::from(&config),
    );
    if config.display {
        let overlay = OverlayConfig {
            display_scale: config.display_scale,
            mirror: config.mirror_display,
            quit_key: config.quit_key,
        };
        driver = driver.with_sink(Box::new(OverlayWindow::new(overlay, cancel.clone())));
    }
    if config.plot {
        driver = driver.with_sink(Box::new(RerunPlotter::spawn("vslam-pilot")?));
    }
    if let Some(path) = &config.trajectory_csv {
        driver = driver.with_sink(Box::new(TrajectoryLog::create(path)?));
    }

    let summary = driver.run();
    info!(
        "Summary: {} iterations, {} frames read ({} failed), tracking {:.0}%, {} commands applied",
        summary.iterations,
        summary.frames_read,
        summary.frame_failures,
        summary.tracking_ratio() * 100.0,
        summary.commands_applied
    );
    if let Some(state) = summary.final_state {
        info!(
            "Final flight state: {} (control disabled cleanly: {})",
            state, summary.disabled_cleanly
        );
    }

    if !summary.reason.is_clean() {
        bail!("Control loop stopped: {}", summary.reason);
    }
    Ok(())
}

fn open_frames(config: &PilotConfig) -> Result<Box<dyn FrameSource>> {
    let source = config.video_source.as_str();
    let frames: Box<dyn FrameSource> = if Path::new(source).is_dir() {
        Box::new(ImageSequenceSource::new(source)?)
    } else if config.drone_camera {
        Box::new(CaptureSource::open_stream(&config.link.video_url(source))?)
    } else {
        Box::new(CaptureSource::open(source)?)
    };
    info!("Reading frames from {}", frames.describe());
    Ok(frames)
}
