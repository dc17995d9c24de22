//! FFT spectrum analysis using RustFFT.
//!
//! Provides the per-window magnitude spectrum and the short-time transform
//! that turns a whole track into a time–frequency magnitude grid.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Spectrum analyzer for audio data.
///
/// Uses a Hann-windowed FFT to convert time-domain samples to a
/// one-sided magnitude spectrum.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    /// Create a new spectrum analyzer with the given FFT size.
    ///
    /// Common FFT sizes: 512, 1024, 2048, 4096
    pub fn new(fft_size: usize) -> Self {
        assert!(fft_size.is_power_of_two(), "FFT size must be a power of 2");

        // Periodic Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / fft_size as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// FFT size being used.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of one-sided frequency bins (DC through Nyquist).
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute the magnitude spectrum of one window of samples.
    ///
    /// Samples beyond `fft_size` are ignored and missing samples are treated
    /// as silence. The returned vector has length `num_bins()`.
    pub fn analyze(&mut self, samples: &[f32]) -> Vec<f32> {
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let s = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        self.scratch[..self.num_bins()]
            .iter()
            .map(|c| c.norm())
            .collect()
    }

    /// Get the frequency in Hz for a given bin index.
    pub fn bin_to_freq(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.fft_size as f32
    }

    /// Short-time Fourier magnitudes of a whole signal.
    ///
    /// Frame `k` is centered on sample `k * hop_size` (zero padded at the
    /// edges), so there are `ceil(len / hop_size)` frames. The result is laid
    /// out frame-major: `grid[k * num_bins() + bin]`.
    pub fn stft(&mut self, samples: &[f32], hop_size: usize) -> StftGrid {
        let hop_size = hop_size.max(1);
        let num_frames = samples.len().div_ceil(hop_size);
        let num_bins = self.num_bins();
        let half = self.fft_size / 2;

        let mut magnitudes = Vec::with_capacity(num_frames * num_bins);
        let mut window = vec![0.0f32; self.fft_size];

        for frame in 0..num_frames {
            let center = frame * hop_size;
            for (i, slot) in window.iter_mut().enumerate() {
                let pos = center as isize - half as isize + i as isize;
                *slot = if pos >= 0 && (pos as usize) < samples.len() {
                    samples[pos as usize]
                } else {
                    0.0
                };
            }
            magnitudes.extend(self.analyze(&window));
        }

        StftGrid {
            magnitudes,
            num_bins,
            num_frames,
        }
    }
}

/// Raw STFT magnitudes, frame-major.
#[derive(Debug, Clone)]
pub struct StftGrid {
    pub magnitudes: Vec<f32>,
    pub num_bins: usize,
    pub num_frames: usize,
}

impl StftGrid {
    /// Convert magnitudes to dB relative to the grid maximum, floored at
    /// `-top_db`, then map `[-top_db, 0]` onto `[0, 1]`.
    pub fn normalize_db(&mut self, top_db: f32) {
        const AMIN: f32 = 1e-5;

        let reference = self
            .magnitudes
            .iter()
            .cloned()
            .fold(0.0f32, f32::max)
            .max(AMIN);
        let ref_db = 20.0 * reference.log10();
        let top_db = top_db.max(f32::EPSILON);

        for m in &mut self.magnitudes {
            let db = (20.0 * m.max(AMIN).log10() - ref_db).max(-top_db);
            *m = ((db + top_db) / top_db).clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn generate_sine(freq: f32, sample_rate: u32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_spectrum_analyzer_creation() {
        let analyzer = SpectrumAnalyzer::new(1024);
        assert_eq!(analyzer.fft_size(), 1024);
        assert_eq!(analyzer.num_bins(), 513);
    }

    #[test]
    fn test_sine_wave_spectrum() {
        let sample_rate = 22050;
        let freq = 440.0;
        let samples = generate_sine(freq, sample_rate, 4096);

        let mut analyzer = SpectrumAnalyzer::new(2048);
        let spectrum = analyzer.analyze(&samples);

        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        let peak_freq = analyzer.bin_to_freq(peak_bin, sample_rate);
        assert!(
            (peak_freq - freq).abs() < 20.0,
            "Expected peak near {} Hz, got {} Hz",
            freq,
            peak_freq
        );
    }

    #[test]
    fn test_stft_frame_count_is_ceil() {
        let mut analyzer = SpectrumAnalyzer::new(512);
        assert_eq!(analyzer.stft(&vec![0.0; 1024], 256).num_frames, 4);
        assert_eq!(analyzer.stft(&vec![0.0; 1025], 256).num_frames, 5);
        assert_eq!(analyzer.stft(&vec![0.0; 1], 256).num_frames, 1);
    }

    #[test]
    fn test_normalize_db_range() {
        let samples = generate_sine(1000.0, 22050, 22050);
        let mut analyzer = SpectrumAnalyzer::new(2048);
        let mut grid = analyzer.stft(&samples, 512);
        grid.normalize_db(80.0);

        assert!(grid.magnitudes.iter().all(|m| (0.0..=1.0).contains(m)));
        // The loudest cell sits exactly at the top of the range
        let max = grid.magnitudes.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_db_silence_maps_to_reference() {
        let mut grid = StftGrid {
            magnitudes: vec![0.0; 8],
            num_bins: 4,
            num_frames: 2,
        };
        grid.normalize_db(80.0);
        // All cells equal the reference, so they map to the top
        assert!(grid.magnitudes.iter().all(|&m| (m - 1.0).abs() < 1e-6));
    }
}
