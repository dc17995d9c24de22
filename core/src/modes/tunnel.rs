//! Neon Tunnel: concentric squares breathing with the bass.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::band_mean;

const SQUARES: usize = 10;
const CYAN: Rgba<u8> = Rgba([0, 255, 255, 255]);
const MAGENTA: Rgba<u8> = Rgba([255, 0, 255, 255]);

pub(super) fn draw(frame: &mut RgbaImage, spectrum: &[f32]) {
    let (w, h) = frame.dimensions();
    let (cx, cy) = ((w / 2) as f32, (h / 2) as f32);

    // Short vectors carry no usable bass range
    let bass = if spectrum.len() > 10 {
        band_mean(spectrum, 0, 10)
    } else {
        0.0
    };

    let max_size = w.min(h) as f32;
    let thickness = (2.0 + bass * 5.0) as i32;

    for i in 0..SQUARES {
        let factor = (i + 1) as f32 / SQUARES as f32;
        let size = max_size * factor * (0.8 + bass * 0.4);
        let color = if i % 2 == 0 { CYAN } else { MAGENTA };

        // Outline grows inward, one pixel per ring
        for k in 0..thickness {
            let side = size as i32 - 2 * k;
            if side <= 0 {
                break;
            }
            let x = (cx - size / 2.0) as i32 + k;
            let y = (cy - size / 2.0) as i32 + k;
            draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(side as u32, side as u32), color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outermost_square_uses_magenta() {
        let mut frame = RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255]));
        draw(&mut frame, &[0.0; 64]);
        // Silent input: outer square side = 200 * 0.8 = 160, left edge at x = 20
        assert_eq!(frame.get_pixel(20, 100), &MAGENTA);
        assert_eq!(frame.get_pixel(100, 100), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_bass_expands_tunnel() {
        let mut quiet = RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255]));
        let mut loud = quiet.clone();
        draw(&mut quiet, &[0.0; 64]);
        draw(&mut loud, &[1.0; 64]);
        let lit = |img: &RgbaImage| img.pixels().filter(|p| p.0[..3] != [0, 0, 0]).count();
        assert!(lit(&loud) > lit(&quiet));
    }
}
