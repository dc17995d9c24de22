//! CPU rasterized modes behind the common backend interface.

use image::{Rgba, RgbaImage};

use super::{bars, kaleidoscope, plasma, pulse, tunnel, waveform, ParticleSystem, VisualizerMode};
use crate::render::{RenderBackend, RenderError};

/// Renders every CPU mode.
///
/// Stateless apart from the owned [`ParticleSystem`], so a backend built
/// with a fixed seed renders the same frame sequence every time.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend {
    particles: ParticleSystem,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with deterministic particle motion.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            particles: ParticleSystem::new(ParticleSystem::DEFAULT_COUNT, seed),
        }
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }
}

impl RenderBackend for CpuBackend {
    fn try_render(
        &mut self,
        mode: VisualizerMode,
        spectrum: &[f32],
        width: u32,
        height: u32,
        time: f32,
    ) -> Result<RgbaImage, RenderError> {
        let mut frame = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        if spectrum.is_empty() || width == 0 || height == 0 {
            return Ok(frame);
        }

        match mode {
            VisualizerMode::Bars => bars::draw(&mut frame, spectrum),
            VisualizerMode::NeonTunnel => tunnel::draw(&mut frame, spectrum),
            VisualizerMode::Waveform => waveform::draw(&mut frame, spectrum),
            VisualizerMode::CirclePulse => pulse::draw(&mut frame, spectrum),
            VisualizerMode::Kaleidoscope => {
                return Ok(kaleidoscope::render(spectrum, width, height, time))
            }
            VisualizerMode::PlasmaFluid => return Ok(plasma::render(spectrum, width, height, time)),
            VisualizerMode::CosmicParticles => self.particles.render(&mut frame, spectrum),
            VisualizerMode::GpuFractal
            | VisualizerMode::NeuralLiquid
            | VisualizerMode::Hyperwarp
            | VisualizerMode::ElectricStorm
            | VisualizerMode::RainbowFlow
            | VisualizerMode::AudioMatrix => {
                log::debug!("{} is a GPU mode, drawing {} instead", mode, VisualizerMode::Bars);
                bars::draw(&mut frame, spectrum)
            }
        }

        Ok(frame)
    }
}
