//! Circle Pulse: a disc sized by the sub-bass.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};

use super::band_energy;

const BASE_RADIUS: f32 = 50.0;
const PULSE_RADIUS: f32 = 150.0;

pub(super) fn draw(frame: &mut RgbaImage, spectrum: &[f32]) {
    let (w, h) = frame.dimensions();
    let center = ((w / 2) as i32, (h / 2) as i32);

    let bass = band_energy(spectrum, 5).clamp(0.0, 1.0);
    let radius = (BASE_RADIUS + bass * PULSE_RADIUS) as i32;

    let fill = Rgba([(bass * 50.0) as u8, 0, (bass * 100.0) as u8, 255]);
    draw_filled_circle_mut(frame, center, radius, fill);

    let outline = Rgba([255, 255, 255, 255]);
    draw_hollow_circle_mut(frame, center, radius, outline);
    draw_hollow_circle_mut(frame, center, radius - 1, outline);
}
