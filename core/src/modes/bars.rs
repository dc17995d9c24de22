//! Bars Spectrum: one vertical bar per band.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// Bars use at most this share of the frame height.
const MAX_HEIGHT: f32 = 0.8;
/// Horizontal gap between neighbouring bars, in pixels.
const GAP: f32 = 2.0;

pub(super) fn draw(frame: &mut RgbaImage, spectrum: &[f32]) {
    let (w, h) = frame.dimensions();
    let bar_width = w as f32 / spectrum.len() as f32;

    for (i, &amp) in spectrum.iter().enumerate() {
        let amp = amp.clamp(0.0, 1.0);
        let bar_height = (amp * h as f32 * MAX_HEIGHT) as u32;
        if bar_height == 0 {
            continue;
        }

        let x = i as f32 * bar_width;
        let width = (bar_width - GAP).max(1.0) as u32;
        let rect = Rect::at(x as i32, (h - bar_height) as i32).of_size(width, bar_height);
        draw_filled_rect_mut(frame, rect, level_color(amp));
    }
}

/// Green, yellow above half, red above 80%.
fn level_color(amp: f32) -> Rgba<u8> {
    if amp > 0.8 {
        Rgba([255, 0, 0, 255])
    } else if amp > 0.5 {
        Rgba([255, 255, 0, 255])
    } else {
        Rgba([0, 255, 0, 255])
    }
}
