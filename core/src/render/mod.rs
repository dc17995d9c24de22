//! Uniform frame rendering over CPU and GPU visualizer modes.
//!
//! Both families implement [`RenderBackend`]. A backend that fails on a frame
//! reports a [`RenderError`]; [`RenderBackend::render`] turns that into a
//! tinted fallback frame so a bad frame never stops the stream.

use image::{Rgba, RgbaImage};

use crate::modes::VisualizerMode;

/// Errors from rendering a single frame.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("Shader for {mode} failed to compile: {message}")]
    ShaderCompile {
        mode: VisualizerMode,
        message: String,
    },

    #[error("GPU context unavailable: {0}")]
    Context(String),

    #[error("Frame readback failed: {0}")]
    Readback(String),

    #[error("Mode {0} is not handled by this backend")]
    UnsupportedMode(VisualizerMode),

    #[error("GPU thread did not answer in time")]
    BridgeTimeout,

    #[error("GPU thread is gone")]
    BridgeDisconnected,

    #[error("Render cancelled")]
    Cancelled,
}

impl RenderError {
    /// Fallback tint for this error, or `None` when the frame should not be
    /// produced at all.
    pub fn fallback(&self) -> Option<Fallback> {
        match self {
            Self::ShaderCompile { .. } => Some(Fallback::ShaderCompile),
            Self::Context(_) | Self::UnsupportedMode(_) | Self::BridgeDisconnected => {
                Some(Fallback::Context)
            }
            Self::Readback(_) => Some(Fallback::Readback),
            Self::BridgeTimeout => Some(Fallback::BridgeTimeout),
            Self::Cancelled => None,
        }
    }
}

/// Failure classes with their own visible tint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    ShaderCompile,
    Readback,
    Context,
    BridgeTimeout,
}

impl Fallback {
    pub fn color(&self) -> [u8; 3] {
        match self {
            Self::ShaderCompile => [20, 0, 0],
            Self::Readback => [0, 20, 0],
            Self::Context => [0, 0, 20],
            Self::BridgeTimeout => [0, 0, 0],
        }
    }
}

/// Solid frame in the tint of `fallback`.
pub fn fallback_frame(fallback: Fallback, width: u32, height: u32) -> RgbaImage {
    let [r, g, b] = fallback.color();
    RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]))
}

/// A renderer for a family of visualizer modes.
pub trait RenderBackend {
    /// Render one frame of `mode` for a spectral vector at `time` seconds.
    fn try_render(
        &mut self,
        mode: VisualizerMode,
        spectrum: &[f32],
        width: u32,
        height: u32,
        time: f32,
    ) -> Result<RgbaImage, RenderError>;

    /// Render one frame, substituting a tinted fallback on failure.
    ///
    /// A cancelled render also yields a black frame here; callers that need
    /// to stop on cancellation should use [`try_render`](Self::try_render).
    fn render(
        &mut self,
        mode: VisualizerMode,
        spectrum: &[f32],
        width: u32,
        height: u32,
        time: f32,
    ) -> RgbaImage {
        match self.try_render(mode, spectrum, width, height, time) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Render of {} failed, using fallback: {}", mode, e);
                let fallback = e.fallback().unwrap_or(Fallback::BridgeTimeout);
                fallback_frame(fallback, width, height)
            }
        }
    }
}
