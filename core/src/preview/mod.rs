//! Live preview on the thread that owns the display and GPU context.
//!
//! A [`PreviewSession`] is ticked at a fixed interval. Every tick first
//! serves pending bridge requests from the export worker, then renders the
//! current mode at the playback position, unless an export is running.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

use crate::audio::SpectralAnalyzer;
use crate::bridge::BridgeConsumer;
use crate::config::RotationConfig;
use crate::modes::{CpuBackend, VisualizerMode};
use crate::pipeline::ModeRotation;
use crate::playback::{MonotonicTime, PlaybackClock, TimeSource};
use crate::render::{fallback_frame, Fallback, RenderBackend};

/// Auto rotation anchored at the session time it was enabled.
struct AutoRotation {
    rotation: ModeRotation,
    origin: f64,
}

pub struct PreviewSession<T: TimeSource + Clone = MonotonicTime> {
    analyzer: Arc<SpectralAnalyzer>,
    clock: PlaybackClock<T>,
    wall: T,
    cpu: CpuBackend,
    gpu: Option<Box<dyn RenderBackend>>,
    bridge: Option<BridgeConsumer>,
    mode: VisualizerMode,
    rotation_config: RotationConfig,
    auto: Option<AutoRotation>,
    exporting: bool,
}

impl PreviewSession<MonotonicTime> {
    pub fn new(analyzer: Arc<SpectralAnalyzer>) -> Self {
        Self::with_time_source(analyzer, MonotonicTime::new())
    }
}

impl<T: TimeSource + Clone> PreviewSession<T> {
    /// Session whose playback clock and wall time both read from `source`.
    pub fn with_time_source(analyzer: Arc<SpectralAnalyzer>, source: T) -> Self {
        Self {
            analyzer,
            clock: PlaybackClock::with_source(source.clone()),
            wall: source,
            cpu: CpuBackend::new(),
            gpu: None,
            bridge: None,
            mode: VisualizerMode::Bars,
            rotation_config: RotationConfig::default(),
            auto: None,
            exporting: false,
        }
    }

    /// Render GPU modes with `backend`, which must live on this thread.
    pub fn with_gpu(mut self, backend: Box<dyn RenderBackend>) -> Self {
        self.gpu = Some(backend);
        self
    }

    /// Serve bridge requests from `consumer` on every tick.
    pub fn with_bridge(mut self, consumer: BridgeConsumer) -> Self {
        self.bridge = Some(consumer);
        self
    }

    pub fn with_rotation_config(mut self, config: RotationConfig) -> Self {
        self.rotation_config = config;
        self
    }

    pub fn analyzer(&self) -> &Arc<SpectralAnalyzer> {
        &self.analyzer
    }

    pub fn clock(&self) -> &PlaybackClock<T> {
        &self.clock
    }

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn stop(&mut self) {
        self.clock.stop();
    }

    pub fn mode(&self) -> VisualizerMode {
        self.mode
    }

    /// Select a mode by hand. Turns auto rotation off.
    pub fn set_mode(&mut self, mode: VisualizerMode) {
        if self.auto.take().is_some() {
            log::info!("Auto rotation disabled by manual selection");
        }
        self.mode = mode;
    }

    /// Rotate randomly through `pool`; an empty pool means every mode.
    pub fn enable_auto_rotation(&mut self, pool: &[VisualizerMode]) {
        let pool = if pool.is_empty() {
            VisualizerMode::all()
        } else {
            pool
        };
        let rotation = ModeRotation::new(
            pool,
            self.mode,
            self.rotation_config.clone(),
            rand::random(),
        );
        self.mode = rotation.current();
        log::info!(
            "Auto rotation enabled over {} modes, starting with {}",
            rotation.pool().len(),
            self.mode
        );
        self.auto = Some(AutoRotation {
            rotation,
            origin: self.elapsed(),
        });
    }

    pub fn disable_auto_rotation(&mut self) {
        self.auto = None;
    }

    pub fn is_auto_rotating(&self) -> bool {
        self.auto.is_some()
    }

    /// Suspend preview rendering while an export runs. Also stops auto rotation.
    pub fn begin_export(&mut self) {
        self.exporting = true;
        self.auto = None;
    }

    pub fn end_export(&mut self) {
        self.exporting = false;
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    /// Seconds since the session was created.
    pub fn elapsed(&self) -> f64 {
        self.wall.now().as_secs_f64()
    }

    /// Serve every queued bridge request. Returns the number rendered.
    pub fn pump_bridge(&mut self) -> usize {
        let Some(bridge) = &self.bridge else {
            return 0;
        };
        match self.gpu.as_deref_mut() {
            Some(gpu) => bridge.drain_with(gpu),
            None => bridge.drain(|req| {
                log::warn!("No GPU backend for {}, answering with fallback", req.mode);
                fallback_frame(Fallback::Context, req.width, req.height)
            }),
        }
    }

    /// Like [`pump_bridge`](Self::pump_bridge), but wait up to `timeout` for
    /// the first request.
    pub fn pump_bridge_for(&mut self, timeout: Duration) -> usize {
        let Some(bridge) = &self.bridge else {
            return 0;
        };
        match self.gpu.as_deref_mut() {
            Some(gpu) => bridge.wait_and_drain(timeout, |req| {
                gpu.render(req.mode, &req.spectrum, req.width, req.height, req.time)
            }),
            None => bridge.wait_and_drain(timeout, |req| {
                fallback_frame(Fallback::Context, req.width, req.height)
            }),
        }
    }

    /// One preview step. Returns `None` while an export is running.
    pub fn tick(&mut self, width: u32, height: u32) -> Option<RgbaImage> {
        self.pump_bridge();
        if self.exporting {
            return None;
        }

        let now = self.elapsed();
        if let Some(auto) = self.auto.as_mut() {
            self.mode = auto.rotation.mode_at(now - auto.origin);
        }

        let spectrum = self.analyzer.query_at(self.clock.current_time());
        let mode = self.mode;
        let backend: &mut dyn RenderBackend = match self.gpu.as_deref_mut() {
            Some(gpu) if mode.is_gpu() => gpu,
            _ => &mut self.cpu,
        };
        Some(backend.render(mode, &spectrum, width, height, now as f32))
    }
}
