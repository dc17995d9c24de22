//! Plasma Fluid: four interfering sine fields tinted by the bass.
//!
//! Computed at quarter resolution and upscaled bilinearly.

use std::f32::consts::PI;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::band_energy;
use super::kaleidoscope::{linspace, to_u8};

const SCALE: u32 = 4;

pub(super) fn render(spectrum: &[f32], width: u32, height: u32, time: f32) -> RgbaImage {
    let sw = (width / SCALE).max(1);
    let sh = (height / SCALE).max(1);
    let bass = band_energy(spectrum, 10);
    let t = time * 3.0;
    let shift = bass * 10.0;

    let small = RgbaImage::from_fn(sw, sh, |px, py| {
        let x = linspace(px, sw, 0.0, 4.0 * PI);
        let y = linspace(py, sh, 0.0, 4.0 * PI);

        let v = (x + t).sin()
            + (y + t).sin()
            + (x + y + t).sin()
            + ((x * x + y * y).sqrt() + t * 2.0).sin();

        let r = (v * PI + shift).sin() * 127.0 + 128.0;
        let g = (v * PI + t).cos() * 127.0 + 128.0;
        let b = (v * PI - shift).sin() * 127.0 + 128.0;

        Rgba([to_u8(r), to_u8(g), to_u8(b), 255])
    });

    imageops::resize(&small, width, height, FilterType::Triangle)
}
