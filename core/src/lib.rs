//! Pulsecast Core
//!
//! Audio-reactive visualizer engine: turns a decoded track into time-indexed
//! spectral vectors and renders them with CPU or GPU visualizer modes, both
//! live and as a deterministic video export.
//!
//! # Features
//!
//! - Audio loading (WAV, MP3, FLAC, AAC) via Symphonia
//! - Background STFT analysis via RustFFT, queryable while it runs
//! - CPU visualizer modes drawn with `image`/`imageproc`
//! - GPU visualizer modes as WGSL fragment programs via wgpu
//! - A single-slot bridge that lets worker threads borrow the GPU thread
//! - Frame-exact, cancellable export to FFmpeg
//!
//! # Threads
//!
//! One thread owns the GPU context and drives a [`PreviewSession`], which
//! also serves [`bridge`] requests. Analysis builds and exports each run on
//! their own worker thread.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod gpu;
pub mod modes;
pub mod pipeline;
pub mod playback;
pub mod preview;
pub mod render;
pub mod video;

// Re-export commonly used types
pub use audio::{
    load_audio, AnalysisState, AudioData, AudioDecoder, SpectralAnalyzer, Spectrogram,
    SymphoniaDecoder,
};
pub use bridge::{gpu_bridge, BridgeConsumer, BridgeError, BridgeProducer, BridgedRenderer};
pub use config::{
    AnalyzerConfig, BridgeConfig, ConfigError, ExportSettings, RotationConfig, VideoCodecParams,
};
pub use gpu::{GpuContext, ShaderBackend};
pub use modes::{CpuBackend, RenderKind, VisualizerMode};
pub use pipeline::{
    CancelToken, ExportError, ExportEvent, ExportHandle, ExportJob, ExportOutcome, ExportPipeline,
    ExportStatus, FailureReason, ModeRotation, ModeSelection,
};
pub use playback::{PlaybackClock, PlaybackState};
pub use preview::PreviewSession;
pub use render::{Fallback, RenderBackend, RenderError};
pub use video::{EncoderFactory, FfmpegFactory, FrameEncoder};
