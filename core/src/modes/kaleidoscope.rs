//! Kaleidoscope: a rotating radial pattern, each ring lit by one band.
//!
//! Computed at half resolution and upscaled with Lanczos.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::band_energy;

const SCALE: u32 = 2;
const MIN_SIDE: u32 = 50;

pub(super) fn render(spectrum: &[f32], width: u32, height: u32, time: f32) -> RgbaImage {
    let sw = (width / SCALE).max(MIN_SIDE);
    let sh = (height / SCALE).max(MIN_SIDE);
    let bass = band_energy(spectrum, 5) * 2.0;
    let bands = spectrum.len();

    let small = RgbaImage::from_fn(sw, sh, |px, py| {
        let x = linspace(px, sw, -1.0, 1.0);
        let y = linspace(py, sh, -1.0, 1.0);
        let r = (x * x + y * y).sqrt();
        let angle = y.atan2(x);

        let pattern = (angle * 6.0 + time * 2.0).sin() + (r * 10.0 - time * 4.0).cos();
        let audio = spectrum[(r * bands as f32) as usize % bands];

        let red = ((r * 5.0 + time * 2.0).sin() * 127.0 + 128.0) * audio;
        let green = ((angle * 3.0 - time * 3.0).cos() * 127.0 + 128.0) * audio;
        let blue = (pattern * 0.5 + 0.5) * audio * 255.0 * (1.0 + bass * 3.0);

        Rgba([to_u8(red), to_u8(green), to_u8(blue), 255])
    });

    imageops::resize(&small, width, height, FilterType::Lanczos3)
}

/// `i`-th of `n` evenly spaced points over `[start, end]`.
pub(super) fn linspace(i: u32, n: u32, start: f32, end: f32) -> f32 {
    if n <= 1 {
        return start;
    }
    start + (end - start) * i as f32 / (n - 1) as f32
}

pub(super) fn to_u8(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}
