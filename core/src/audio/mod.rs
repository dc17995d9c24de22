//! Audio loading and spectral analysis.
//!
//! This module provides:
//! - Audio file loading via Symphonia (WAV, MP3, FLAC, AAC)
//! - Short-time FFT via RustFFT with dB normalization
//! - The immutable analyzed track and its time-indexed band vectors
//! - A background analyzer with placeholder output while a build runs

pub mod analyzer;
pub mod fft;
pub mod loader;
pub mod spectrogram;
pub mod synth;

pub use analyzer::{
    placeholder_vector, AnalysisHandle, AnalysisState, BuildOutcome, ReadyCallback,
    SpectralAnalyzer,
};
pub use fft::{SpectrumAnalyzer, StftGrid};
pub use loader::{load_audio, resample_linear, AudioData, AudioDecoder, AudioError, SymphoniaDecoder};
pub use spectrogram::{reduce_bands, AnalysisError, Spectrogram};
pub use synth::{generate_click_track, generate_sine, generate_sweep, generate_white_noise};
