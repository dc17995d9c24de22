//! Waveform: a zig-zag line through the band amplitudes.
//!
//! Magnitudes are never negative, so alternate bands are mirrored below the
//! center line to read as a wave.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

const COLOR: Rgba<u8> = Rgba([0, 150, 255, 255]);
const LINE_WIDTH: i32 = 3;

pub(super) fn draw(frame: &mut RgbaImage, spectrum: &[f32]) {
    let (w, h) = frame.dimensions();
    let step_x = w as f32 / spectrum.len() as f32;
    let center_y = h as f32 / 2.0;

    let points: Vec<(f32, f32)> = spectrum
        .iter()
        .enumerate()
        .map(|(i, &amp)| {
            let offset = amp * (h as f32 / 3.0);
            let direction = if i % 2 == 0 { 1.0 } else { -1.0 };
            (i as f32 * step_x, center_y + offset * direction)
        })
        .collect();

    for pair in points.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        for dy in -(LINE_WIDTH / 2)..=(LINE_WIDTH / 2) {
            let dy = dy as f32;
            draw_line_segment_mut(frame, (start.0, start.1 + dy), (end.0, end.1 + dy), COLOR);
        }
    }
}
