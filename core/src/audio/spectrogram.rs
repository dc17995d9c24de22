//! The analyzed track: an immutable, normalized time–frequency grid.

use std::path::{Path, PathBuf};

use super::fft::SpectrumAnalyzer;
use super::loader::{resample_linear, AudioData, AudioError};
use crate::config::{AnalyzerConfig, ConfigError};

/// Errors that can occur while building a spectrogram.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Decode failed: {0}")]
    Decode(#[from] AudioError),
    #[error("Track has no samples")]
    EmptyTrack,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Analysis panicked: {0}")]
    Panicked(String),
}

/// A fully analyzed track.
///
/// Built once by the analyzer and never mutated afterwards, so it can be
/// shared across threads behind an `Arc` without locking.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Mono samples at `sample_rate`.
    samples: Vec<f32>,
    sample_rate: u32,
    duration: f64,
    /// Normalized magnitudes in [0, 1], frame-major.
    grid: Vec<f32>,
    num_bins: usize,
    num_frames: usize,
    hop_size: usize,
    fft_size: usize,
    source: Option<PathBuf>,
}

impl Spectrogram {
    /// Analyze decoded audio.
    ///
    /// Downmixes to mono, resamples to the configured analysis rate, runs the
    /// STFT and normalizes the magnitudes onto [0, 1].
    pub fn from_audio(
        audio: &AudioData,
        source: Option<PathBuf>,
        config: &AnalyzerConfig,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;

        let mono = audio.to_mono();
        if mono.is_empty() || audio.sample_rate == 0 {
            return Err(AnalysisError::EmptyTrack);
        }

        let sample_rate = config.target_sample_rate.unwrap_or(audio.sample_rate);
        let samples = resample_linear(&mono, audio.sample_rate, sample_rate);

        let mut analyzer = SpectrumAnalyzer::new(config.fft_size);
        let mut stft = analyzer.stft(&samples, config.hop_size);
        stft.normalize_db(config.top_db);

        Ok(Self {
            duration: samples.len() as f64 / sample_rate as f64,
            samples,
            sample_rate,
            grid: stft.magnitudes,
            num_bins: stft.num_bins,
            num_frames: stft.num_frames,
            hop_size: config.hop_size,
            fft_size: config.fft_size,
            source,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// File the track was decoded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Spectral frame for a playback time, clamped to the analyzed range.
    pub fn frame_index(&self, time: f64) -> usize {
        let last = self.num_frames.saturating_sub(1);
        let frame = (time * self.sample_rate as f64 / self.hop_size as f64).floor();
        if frame.is_nan() || frame <= 0.0 {
            0
        } else if frame >= last as f64 {
            last
        } else {
            frame as usize
        }
    }

    /// All bins of one spectral frame.
    pub fn column(&self, frame: usize) -> &[f32] {
        let frame = frame.min(self.num_frames.saturating_sub(1));
        let start = frame * self.num_bins;
        &self.grid[start..start + self.num_bins]
    }

    /// Spectral vector of `len` bands at `time`.
    ///
    /// Pure function of `time`: repeated calls return identical vectors.
    pub fn vector_at(&self, time: f64, len: usize) -> Vec<f32> {
        reduce_bands(self.column(self.frame_index(time)), len)
    }
}

/// Reduce a spectral column to `len` bands by uniform stride sampling.
///
/// Takes every `step`-th bin with `step = max(1, column.len() / len)` and keeps
/// the first `len` of them; bins past `len * step` are dropped. Columns too
/// short to fill `len` bands are padded with zeros.
pub fn reduce_bands(column: &[f32], len: usize) -> Vec<f32> {
    let step = (column.len() / len.max(1)).max(1);
    let mut bands: Vec<f32> = column.iter().step_by(step).take(len).copied().collect();
    bands.resize(len, 0.0);
    bands
}
