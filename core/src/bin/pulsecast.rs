//! Headless exporter.
//!
//! The main thread owns the GPU context and serves bridge requests while the
//! export runs on its worker thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use pulsecast::audio::BuildOutcome;
use pulsecast::config::{AnalyzerConfig, BridgeConfig, ExportSettings, RotationConfig};
use pulsecast::pipeline::{default_output_name, unique_output_path};
use pulsecast::{
    gpu_bridge, ExportEvent, ExportJob, ExportOutcome, ExportPipeline, FfmpegFactory,
    ModeSelection, PreviewSession, ShaderBackend, SpectralAnalyzer, VisualizerMode,
};

#[derive(Parser, Debug)]
#[command(name = "pulsecast", about = "Audio-reactive visualizer video exporter")]
struct Cli {
    /// Input audio file (WAV, MP3, FLAC, AAC)
    input: Option<PathBuf>,

    /// Output video file. Defaults to `<track>_visualizer.mp4` next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Visualizer mode, by display name or slug
    #[arg(short, long, default_value = "Bars Spectrum")]
    mode: String,

    /// Rotate randomly between modes
    #[arg(long)]
    random: bool,

    /// Modes eligible for rotation (comma-separated). Empty means all.
    #[arg(long, value_delimiter = ',')]
    pool: Vec<String>,

    /// Export settings as JSON; overrides the size and codec flags
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// H.264 CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    crf: u32,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    codec: String,

    /// Seconds to render; defaults to the whole track
    #[arg(long)]
    duration: Option<f64>,

    /// Seed for mode rotation and particle motion
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Milliseconds to wait for a GPU frame before using a fallback
    #[arg(long, default_value_t = 10_000)]
    gpu_timeout_ms: u64,

    /// Render GPU modes without a GPU (they use fallback frames)
    #[arg(long)]
    no_gpu: bool,

    /// List available modes and exit
    #[arg(long)]
    list_modes: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_modes {
        for mode in VisualizerMode::all() {
            println!("{:<18} {:?}  {}", mode.name(), mode.kind(), mode.description());
        }
        return Ok(());
    }

    let input = cli.input.clone().context("No input file given")?;
    let settings = export_settings(&cli)?;
    let output = match &cli.output {
        Some(path) => path.clone(),
        None => {
            let folder = input
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            unique_output_path(&folder, &default_output_name(&input))
        }
    };

    let analyzer = Arc::new(SpectralAnalyzer::new(AnalyzerConfig::default()));
    match analyzer.load(&input).wait(Duration::from_secs(600)) {
        Some(BuildOutcome::Ready) => {}
        Some(BuildOutcome::Failed) => bail!(
            "Analysis of {} failed: {}",
            input.display(),
            analyzer.last_error().unwrap_or_default()
        ),
        Some(BuildOutcome::Superseded) | None => bail!("Analysis of {} did not finish", input.display()),
    }

    let bridge_config = BridgeConfig {
        timeout_ms: cli.gpu_timeout_ms,
        ..BridgeConfig::default()
    };
    let interval = bridge_config.consumer_interval();
    let (producer, consumer) = gpu_bridge(bridge_config);

    let mut session = PreviewSession::new(Arc::clone(&analyzer)).with_bridge(consumer);
    if !cli.no_gpu {
        match ShaderBackend::new_blocking() {
            Ok(backend) => session = session.with_gpu(Box::new(backend)),
            Err(e) => log::warn!("GPU unavailable, GPU modes will use fallback frames: {}", e),
        }
    }

    let mode = VisualizerMode::from_name_or_default(&cli.mode);
    let selection = if cli.random {
        ModeSelection::Rotating {
            pool: cli
                .pool
                .iter()
                .map(|name| VisualizerMode::from_name_or_default(name))
                .collect(),
            fallback: mode,
        }
    } else {
        ModeSelection::Fixed(mode)
    };

    let mut job = ExportJob::new(&output, settings, selection)
        .with_seed(cli.seed)
        .with_rotation(RotationConfig::default());
    if let Some(seconds) = cli.duration {
        job = job.with_duration(seconds);
    }

    let pipeline = ExportPipeline::new(Arc::new(FfmpegFactory::new())).with_bridge(producer);
    session.begin_export();
    let handle = pipeline.start(&analyzer, job)?;

    let mut logged_decile = 0;
    while !handle.is_finished() {
        session.pump_bridge_for(interval);
        for event in handle.events().try_iter() {
            if let ExportEvent::Progress(percent) = event {
                let decile = (percent / 10.0) as u32;
                if decile > logged_decile {
                    logged_decile = decile;
                    log::info!("Export progress: {:.0}%", percent);
                }
            }
        }
    }
    let outcome = handle.join();
    session.end_export();

    match outcome {
        ExportOutcome::Completed => {
            log::info!("Wrote {}", output.display());
            Ok(())
        }
        ExportOutcome::Cancelled => bail!("Export cancelled"),
        ExportOutcome::Failed(reason) => bail!("Export failed ({:?}), see log for details", reason),
    }
}

fn export_settings(cli: &Cli) -> Result<ExportSettings> {
    if let Some(path) = &cli.settings {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return ExportSettings::from_json(&json)
            .with_context(|| format!("Invalid settings in {}", path.display()));
    }

    let mut settings = ExportSettings {
        width: cli.width,
        height: cli.height,
        fps: cli.fps,
        ..ExportSettings::default()
    };
    settings.codec.crf = cli.crf;
    settings.codec.codec = cli.codec.clone();
    settings.validate()?;
    Ok(settings)
}
