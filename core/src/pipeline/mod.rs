//! Deterministic offline export.
//!
//! An export renders frame `i` at `t = i / fps` for every `i` in
//! `0..floor(duration * fps)`, independent of wall time, and streams the
//! frames in order to a [`FrameEncoder`]. CPU modes render on the export
//! worker; GPU modes are sent across the bridge to the thread that owns the
//! GPU context.

pub mod cleanup;
pub mod job;
pub mod rotation;

pub use cleanup::{
    cleanup_export, default_output_name, temp_artifacts, unique_output_path, MIN_OUTPUT_BYTES,
    TEMP_SUFFIXES,
};
pub use job::{CancelToken, ExportJob, ModeSelection, ProgressCell};
pub use rotation::ModeRotation;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;

use crate::audio::{AnalysisState, SpectralAnalyzer, Spectrogram};
use crate::bridge::{BridgeProducer, BridgedRenderer};
use crate::config::ConfigError;
use crate::modes::{CpuBackend, RenderKind, VisualizerMode};
use crate::render::{fallback_frame, RenderBackend};
use crate::video::{EncodeSpec, EncoderFactory, FrameEncoder};

/// Errors that prevent an export from starting.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Audio analysis is not ready (state: {0:?})")]
    AnalysisNotReady(AnalysisState),
    #[error("An export is already rendering")]
    AlreadyRendering,
    #[error("Invalid export settings: {0}")]
    InvalidSettings(#[from] ConfigError),
    #[error("Failed to start export worker: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse cause of a failed export. Details go to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The encoder rejected a frame or could not finalize the file.
    Encode,
    /// The encoder could not be opened.
    Setup,
    /// The worker thread panicked.
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed,
    Cancelled,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Idle,
    Rendering,
    Completed,
    Cancelled,
    Failed,
}

impl From<ExportOutcome> for ExportStatus {
    fn from(outcome: ExportOutcome) -> Self {
        match outcome {
            ExportOutcome::Completed => ExportStatus::Completed,
            ExportOutcome::Cancelled => ExportStatus::Cancelled,
            ExportOutcome::Failed(_) => ExportStatus::Failed,
        }
    }
}

/// Messages from the export worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportEvent {
    /// Percentage of frames written, in `(0, 100]`.
    Progress(f32),
    Finished(ExportOutcome),
}

/// Runs one export at a time on a worker thread.
///
/// A finished export (completed, cancelled or failed) leaves the pipeline
/// ready for the next job.
pub struct ExportPipeline {
    encoders: Arc<dyn EncoderFactory>,
    bridge: Option<BridgeProducer>,
    status: Arc<Mutex<ExportStatus>>,
}

impl ExportPipeline {
    pub fn new(encoders: Arc<dyn EncoderFactory>) -> Self {
        Self {
            encoders,
            bridge: None,
            status: Arc::new(Mutex::new(ExportStatus::Idle)),
        }
    }

    /// Route GPU modes through `producer`. Without a bridge GPU modes are
    /// drawn by the CPU backend's substitute.
    pub fn with_bridge(mut self, producer: BridgeProducer) -> Self {
        self.bridge = Some(producer);
        self
    }

    pub fn status(&self) -> ExportStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_rendering(&self) -> bool {
        self.status() == ExportStatus::Rendering
    }

    /// Validate `job` and start rendering it on a worker thread.
    pub fn start(
        &self,
        analyzer: &SpectralAnalyzer,
        job: ExportJob,
    ) -> Result<ExportHandle, ExportError> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == ExportStatus::Rendering {
            return Err(ExportError::AlreadyRendering);
        }
        let track = analyzer
            .track()
            .ok_or_else(|| ExportError::AnalysisNotReady(analyzer.state()))?;
        job.settings.validate()?;
        if matches!(job.selection, ModeSelection::Rotating { .. }) {
            job.rotation.validate()?;
        }

        let duration = job.duration.unwrap_or_else(|| track.duration());
        let worker = Worker {
            total: job.total_frames(duration),
            bands: analyzer.bands(),
            track,
            job: job.clone(),
            encoders: Arc::clone(&self.encoders),
            bridge: self.bridge.clone(),
        };

        log::info!(
            "Starting export: {}x{} @ {}fps, {:.2}s ({} frames), {:?} -> {}",
            job.settings.width,
            job.settings.height,
            job.settings.fps,
            duration,
            worker.total,
            job.selection,
            job.output.display()
        );

        let (events_tx, events_rx) = unbounded();
        let previous = *status;
        *status = ExportStatus::Rendering;
        let shared_status = Arc::clone(&self.status);

        let spawned = thread::Builder::new()
            .name("export-worker".into())
            .spawn(move || {
                let outcome = worker.run(&events_tx);
                *shared_status.lock().unwrap_or_else(PoisonError::into_inner) = outcome.into();
                let _ = events_tx.send(ExportEvent::Finished(outcome));
                outcome
            });

        match spawned {
            Ok(join) => Ok(ExportHandle {
                join,
                cancel: job.cancel_token(),
                progress: job.progress(),
                events: events_rx,
            }),
            Err(e) => {
                *status = previous;
                Err(ExportError::Io(e))
            }
        }
    }
}

/// Caller's view of a running export.
pub struct ExportHandle {
    join: JoinHandle<ExportOutcome>,
    cancel: CancelToken,
    progress: ProgressCell,
    events: Receiver<ExportEvent>,
}

impl ExportHandle {
    /// Request cancellation; observed before the next frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Latest progress percentage.
    pub fn progress(&self) -> f32 {
        self.progress.get()
    }

    pub fn events(&self) -> &Receiver<ExportEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the export ends.
    pub fn join(self) -> ExportOutcome {
        self.join
            .join()
            .unwrap_or(ExportOutcome::Failed(FailureReason::Worker))
    }
}

/// Everything the export thread owns.
struct Worker {
    job: ExportJob,
    track: Arc<Spectrogram>,
    total: u64,
    bands: usize,
    encoders: Arc<dyn EncoderFactory>,
    bridge: Option<BridgeProducer>,
}

enum Schedule {
    Fixed(VisualizerMode),
    Rotating(ModeRotation),
}

impl Schedule {
    fn mode_at(&mut self, time: f64) -> VisualizerMode {
        match self {
            Schedule::Fixed(mode) => *mode,
            Schedule::Rotating(rotation) => rotation.mode_at(time),
        }
    }
}

/// Sends each mode to the backend that can render it on this thread.
struct FrameRouter {
    cpu: CpuBackend,
    gpu: Option<BridgedRenderer>,
}

impl FrameRouter {
    /// `None` means the render was cancelled and no frame should be written.
    fn render(
        &mut self,
        mode: VisualizerMode,
        spectrum: &[f32],
        width: u32,
        height: u32,
        time: f32,
    ) -> Option<RgbaImage> {
        let backend: &mut dyn RenderBackend = match (mode.kind(), self.gpu.as_mut()) {
            (RenderKind::Gpu, Some(gpu)) => gpu,
            _ => &mut self.cpu,
        };
        match backend.try_render(mode, spectrum, width, height, time) {
            Ok(frame) => Some(frame),
            Err(e) => {
                let fallback = e.fallback()?;
                log::warn!("Frame at {:.3}s fell back: {}", time, e);
                Some(fallback_frame(fallback, width, height))
            }
        }
    }
}

impl Worker {
    fn run(self, events: &Sender<ExportEvent>) -> ExportOutcome {
        let output = self.job.output.clone();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.render(events))) {
            Ok(outcome) => outcome,
            Err(_) => {
                log::error!("Export worker panicked");
                ExportOutcome::Failed(FailureReason::Worker)
            }
        };

        cleanup_export(&output, &outcome);
        log::info!("Export finished: {:?}", outcome);
        outcome
    }

    fn render(&self, events: &Sender<ExportEvent>) -> ExportOutcome {
        let job = &self.job;
        let settings = &job.settings;
        let audio = job.audio.as_deref().or_else(|| self.track.source());
        let spec = EncodeSpec::new(&job.output, settings, audio);

        let mut encoder = match self.encoders.open(&spec) {
            Ok(encoder) => encoder,
            Err(e) => {
                log::error!("Failed to open encoder for {}: {}", job.output.display(), e);
                return ExportOutcome::Failed(FailureReason::Setup);
            }
        };

        let mut schedule = match &job.selection {
            ModeSelection::Fixed(mode) => Schedule::Fixed(*mode),
            ModeSelection::Rotating { pool, fallback } => Schedule::Rotating(ModeRotation::new(
                pool,
                *fallback,
                job.rotation.clone(),
                job.seed,
            )),
        };
        let cancel = job.cancel_token();
        let mut router = FrameRouter {
            cpu: CpuBackend::with_seed(job.seed),
            gpu: self
                .bridge
                .clone()
                .map(|producer| BridgedRenderer::new(producer, cancel.flag())),
        };

        let fps = settings.fps as f64;
        let progress = job.progress();
        let mut outcome = ExportOutcome::Completed;

        for index in 0..self.total {
            if cancel.is_cancelled() {
                log::info!("Export cancelled before frame {}/{}", index, self.total);
                outcome = ExportOutcome::Cancelled;
                break;
            }

            let time = index as f64 / fps;
            let mode = schedule.mode_at(time);
            let spectrum = self.track.vector_at(time, self.bands);
            let Some(frame) =
                router.render(mode, &spectrum, settings.width, settings.height, time as f32)
            else {
                log::info!("Export cancelled during frame {}/{}", index, self.total);
                outcome = ExportOutcome::Cancelled;
                break;
            };

            if let Err(e) = encoder.write_frame(frame.as_raw()) {
                log::error!("Encoder failed at frame {}: {}", index, e);
                outcome = ExportOutcome::Failed(FailureReason::Encode);
                break;
            }

            let percent = (index + 1) as f32 / self.total as f32 * 100.0;
            progress.set(percent);
            let _ = events.send(ExportEvent::Progress(percent));
        }

        finish_encoder(encoder, outcome, &progress, events)
    }
}

/// Close the encoder the way `outcome` requires.
fn finish_encoder(
    encoder: Box<dyn FrameEncoder>,
    outcome: ExportOutcome,
    progress: &ProgressCell,
    events: &Sender<ExportEvent>,
) -> ExportOutcome {
    if outcome != ExportOutcome::Completed {
        encoder.abort();
        return outcome;
    }
    match encoder.finish() {
        Ok(()) => {
            progress.set(100.0);
            let _ = events.send(ExportEvent::Progress(100.0));
            ExportOutcome::Completed
        }
        Err(e) => {
            log::error!("Failed to finalize video: {}", e);
            ExportOutcome::Failed(FailureReason::Encode)
        }
    }
}
