//! Synthetic audio generation for tests and benches.
//!
//! Signals are deterministic so analyzed spectrograms and rendered frames
//! can be compared across runs.

use std::f32::consts::PI;

/// Generate a sine wave.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `duration` - Duration in seconds
/// * `amplitude` - Amplitude (0.0 to 1.0)
pub fn generate_sine(frequency: f32, sample_rate: u32, duration: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Generate a linear frequency sweep from `start_freq` to `end_freq`.
///
/// The dominant spectral bin moves with time, which makes the sweep useful
/// for checking that time-indexed queries return different columns.
pub fn generate_sweep(
    start_freq: f32,
    end_freq: f32,
    sample_rate: u32,
    duration: f32,
    amplitude: f32,
) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    let rate = (end_freq - start_freq) / duration.max(f32::EPSILON);
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            // Phase is the integral of the instantaneous frequency
            let phase = 2.0 * PI * (start_freq * t + 0.5 * rate * t * t);
            amplitude * phase.sin()
        })
        .collect()
}

/// Generate white noise.
///
/// Uses a linear congruential generator so the same seed always yields the
/// same samples.
pub fn generate_white_noise(
    sample_rate: u32,
    duration: f32,
    amplitude: f32,
    seed: u64,
) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;

    let mut state = seed;
    let a: u64 = 6364136223846793005;
    let c: u64 = 1442695040888963407;

    (0..num_samples)
        .map(|_| {
            state = state.wrapping_mul(a).wrapping_add(c);
            let normalized = (state as f32 / u64::MAX as f32) * 2.0 - 1.0;
            amplitude * normalized
        })
        .collect()
}

/// Generate a click track (metronome).
///
/// Creates short decaying clicks at regular intervals based on BPM.
pub fn generate_click_track(
    bpm: f32,
    sample_rate: u32,
    duration: f32,
    click_freq: f32,
) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    let samples_per_beat = ((60.0 / bpm * sample_rate as f32) as usize).max(1);
    let click_samples = (sample_rate as f32 * 0.01) as usize; // 10ms click

    let mut samples = vec![0.0; num_samples];

    let mut pos = 0;
    while pos < num_samples {
        for i in 0..click_samples.min(num_samples - pos) {
            let t = i as f32 / sample_rate as f32;
            let envelope = (1.0 - i as f32 / click_samples as f32).powi(2);
            samples[pos + i] = envelope * (2.0 * PI * click_freq * t).sin();
        }
        pos += samples_per_beat;
    }

    samples
}

/// Interleave a mono signal into `channels` identical channels.
pub fn interleave(mono: &[f32], channels: usize) -> Vec<f32> {
    mono.iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels.max(1)))
        .collect()
}
