//! Typed configuration handed to the core by an external settings layer.
//!
//! Everything derives serde so a caller can pass settings as JSON; defaults
//! mirror the values the visualizer has always shipped with.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors raised when validating parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Spectral analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// FFT window size (power of two).
    pub fft_size: usize,
    /// Samples between successive spectral frames.
    pub hop_size: usize,
    /// Resample decoded audio to this rate before analysis. `None` keeps the native rate.
    pub target_sample_rate: Option<u32>,
    /// Length of every spectral vector.
    pub bands: usize,
    /// Dynamic range kept below the loudest cell, in dB.
    pub top_db: f32,
    /// Upper bound of placeholder values returned before analysis is ready.
    pub placeholder_amplitude: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_size: 512,
            target_sample_rate: Some(22050),
            bands: 64,
            top_db: 80.0,
            placeholder_amplitude: 0.1,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 16 {
            return Err(ConfigError::Invalid(format!(
                "fft_size must be a power of two >= 16, got {}",
                self.fft_size
            )));
        }
        if self.hop_size == 0 {
            return Err(ConfigError::Invalid("hop_size must be positive".into()));
        }
        if self.target_sample_rate == Some(0) {
            return Err(ConfigError::Invalid(
                "target_sample_rate must be positive".into(),
            ));
        }
        if self.bands == 0 {
            return Err(ConfigError::Invalid("bands must be positive".into()));
        }
        if !(self.placeholder_amplitude > 0.0 && self.placeholder_amplitude <= 1.0) {
            return Err(ConfigError::Invalid(
                "placeholder_amplitude must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// GPU bridge timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a producer waits for a GPU frame before giving up.
    pub timeout_ms: u64,
    /// Granularity of the producer wait, bounding how late cancellation is seen.
    pub poll_slice_ms: u64,
    /// How often the context-owning thread drains the request queue.
    pub consumer_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            poll_slice_ms: 50,
            consumer_interval_ms: 5,
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_slice(&self) -> Duration {
        Duration::from_millis(self.poll_slice_ms.max(1))
    }

    pub fn consumer_interval(&self) -> Duration {
        Duration::from_millis(self.consumer_interval_ms.max(1))
    }
}

/// Random mode rotation timing, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub min_interval: f64,
    pub max_interval: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            min_interval: 5.0,
            max_interval: 10.0,
        }
    }
}

impl RotationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_interval > 0.0 && self.min_interval < self.max_interval) {
            return Err(ConfigError::Invalid(format!(
                "rotation interval must satisfy 0 < min < max, got [{}, {})",
                self.min_interval, self.max_interval
            )));
        }
        Ok(())
    }
}

/// Codec parameters passed through to the video encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoCodecParams {
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for VideoCodecParams {
    fn default() -> Self {
        Self {
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            preset: "medium".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
        }
    }
}

/// Output parameters for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodecParams,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60,
            codec: VideoCodecParams::default(),
        }
    }
}

impl ExportSettings {
    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=240).contains(&self.fps) {
            return Err(ConfigError::Invalid(format!(
                "fps must be within 1..=240, got {}",
                self.fps
            )));
        }
        // 4:2:0 chroma subsampling needs even dimensions
        if self.codec.pix_fmt.ends_with("420p") && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(ConfigError::Invalid(format!(
                "{} requires even dimensions, got {}x{}",
                self.codec.pix_fmt, self.width, self.height
            )));
        }
        Ok(())
    }
}
