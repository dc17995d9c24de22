//! Per-export parameters and the state shared with the worker.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::{ExportSettings, RotationConfig};
use crate::modes::VisualizerMode;

/// Cooperative cancellation flag shared between the caller and the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// The underlying flag, for waits that poll it directly.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Latest progress percentage, written by the worker and read by anyone.
#[derive(Debug, Clone, Default)]
pub struct ProgressCell(Arc<AtomicU32>);

impl ProgressCell {
    pub fn set(&self, percent: f32) {
        self.0.store(percent.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// Which visualizer modes an export renders.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeSelection {
    Fixed(VisualizerMode),
    /// Re-pick randomly from `pool`; an empty pool renders `fallback` throughout.
    Rotating {
        pool: Vec<VisualizerMode>,
        fallback: VisualizerMode,
    },
}

impl Default for ModeSelection {
    fn default() -> Self {
        ModeSelection::Fixed(VisualizerMode::Bars)
    }
}

/// One export invocation. Consumed by [`ExportPipeline::start`](super::ExportPipeline::start).
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub output: PathBuf,
    pub settings: ExportSettings,
    /// Seconds to render; `None` renders the whole track.
    pub duration: Option<f64>,
    pub selection: ModeSelection,
    pub rotation: RotationConfig,
    /// Seeds mode rotation and particle motion.
    pub seed: u64,
    /// Audio muxed into the output; `None` uses the analyzed track's file.
    pub audio: Option<PathBuf>,
    cancel: CancelToken,
    progress: ProgressCell,
}

impl ExportJob {
    pub fn new(output: impl Into<PathBuf>, settings: ExportSettings, selection: ModeSelection) -> Self {
        Self {
            output: output.into(),
            settings,
            duration: None,
            selection,
            rotation: RotationConfig::default(),
            seed: 0,
            audio: None,
            cancel: CancelToken::new(),
            progress: ProgressCell::default(),
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_audio(mut self, audio: impl AsRef<Path>) -> Self {
        self.audio = Some(audio.as_ref().to_path_buf());
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> ProgressCell {
        self.progress.clone()
    }

    /// Number of frames for a render of `seconds`.
    pub fn total_frames(&self, seconds: f64) -> u64 {
        if !(seconds > 0.0) {
            return 0;
        }
        (seconds * self.settings.fps as f64).floor() as u64
    }
}
