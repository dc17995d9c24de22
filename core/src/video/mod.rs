//! Video output.
//!
//! The export loop only sees the [`FrameEncoder`] / [`EncoderFactory`]
//! contract. [`FfmpegFactory`] is the production implementation: it pipes
//! raw RGBA frames into an `ffmpeg` process that also muxes the source audio.

pub mod encoder;
pub mod ffmpeg;

pub use encoder::{EncodeSpec, EncoderFactory, FrameEncoder, VideoError};
pub use ffmpeg::{ffmpeg_args, FfmpegEncoder, FfmpegFactory};
