//! Cosmic Particles: a starfield drifting left, accelerating on the bass.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::band_energy;

/// A single star.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    /// Pixels per frame before the bass boost.
    pub speed: f32,
    pub size: f32,
    /// Base color, each channel in [0, 1].
    pub color: [f32; 3],
}

/// Owned particle state for one render session.
///
/// Positions persist between frames. Two systems built with the same seed
/// and fed the same spectra produce the same frames.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
    count: usize,
    rng: StdRng,
    bounds: (u32, u32),
}

impl ParticleSystem {
    pub const DEFAULT_COUNT: usize = 200;

    pub fn new(count: usize, seed: u64) -> Self {
        Self {
            particles: Vec::with_capacity(count),
            count,
            rng: StdRng::seed_from_u64(seed),
            bounds: (0, 0),
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Advance one frame and draw onto `frame`.
    pub fn render(&mut self, frame: &mut RgbaImage, spectrum: &[f32]) {
        let bass = band_energy(spectrum, 5);
        self.step(frame.dimensions(), bass);
        self.draw(frame, bass);
    }

    /// Move every particle left; particles leaving the frame re-enter on the
    /// right at a random height.
    pub fn step(&mut self, bounds: (u32, u32), bass: f32) {
        if self.bounds != bounds || self.particles.len() != self.count {
            self.spawn(bounds);
        }

        let (w, h) = (bounds.0 as f32, bounds.1 as f32);
        let speed_factor = 1.0 + bass * 50.0;
        for p in &mut self.particles {
            p.x -= p.speed * speed_factor;
            if p.x < 0.0 {
                p.x = w;
                p.y = self.rng.gen::<f32>() * h;
            }
        }
    }

    fn spawn(&mut self, bounds: (u32, u32)) {
        let (w, h) = (bounds.0 as f32, bounds.1 as f32);
        let rng = &mut self.rng;
        self.particles = (0..self.count)
            .map(|_| Particle {
                x: rng.gen::<f32>() * w,
                y: rng.gen::<f32>() * h,
                speed: rng.gen::<f32>() * 5.0 + 2.0,
                size: rng.gen::<f32>() * 3.0 + 1.0,
                color: [rng.gen(), rng.gen(), rng.gen()],
            })
            .collect();
        self.bounds = bounds;
    }

    fn draw(&self, frame: &mut RgbaImage, bass: f32) {
        let boost = 1.0 + bass * 2.0;
        for p in &self.particles {
            let size = p.size * (1.0 + bass * 5.0);
            let [r, g, b] = p.color.map(|c| (c * 255.0 * boost).min(255.0) as u8);
            let center = ((p.x + size / 2.0) as i32, (p.y + size / 2.0) as i32);
            draw_filled_circle_mut(frame, center, (size / 2.0) as i32, Rgba([r, g, b, 255]));
        }
    }
}

impl Default for ParticleSystem {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COUNT, rand::random())
    }
}
