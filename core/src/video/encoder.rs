//! Contract between the export loop and whatever writes the video file.

use std::path::{Path, PathBuf};

use crate::config::{ExportSettings, VideoCodecParams};

/// Errors that can occur during video encoding.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to write to encoder: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoder exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },
    #[error("Invalid encoder configuration: {0}")]
    InvalidConfig(String),
}

/// Everything an encoder needs to open an output.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSpec {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodecParams,
    /// Source track muxed into the output, if any.
    pub audio: Option<PathBuf>,
}

impl EncodeSpec {
    pub fn new(output: &Path, settings: &ExportSettings, audio: Option<&Path>) -> Self {
        Self {
            output: output.to_path_buf(),
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            codec: settings.codec.clone(),
            audio: audio.map(Path::to_path_buf),
        }
    }

    /// Size in bytes of one RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Sink for sequential RGBA frames.
///
/// Frames arrive in strictly increasing order. Exactly one of
/// [`finish`](FrameEncoder::finish) or [`abort`](FrameEncoder::abort) is
/// called at the end.
pub trait FrameEncoder: Send {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<(), VideoError>;

    /// Flush and close the output.
    fn finish(self: Box<Self>) -> Result<(), VideoError>;

    /// Stop without finalizing; the output may be left incomplete.
    fn abort(self: Box<Self>);
}

/// Opens a [`FrameEncoder`] per export.
pub trait EncoderFactory: Send + Sync {
    fn open(&self, spec: &EncodeSpec) -> Result<Box<dyn FrameEncoder>, VideoError>;
}
