//! Visualizer mode registry.
//!
//! Every mode is a variant of [`VisualizerMode`] tagged CPU or GPU. CPU modes
//! are drawn by [`CpuBackend`]; GPU modes by the shader backend in
//! [`crate::gpu`]. Dispatch is an exhaustive match, so adding a variant
//! without a renderer fails to compile.
//!
//! CPU modes:
//! - Bars Spectrum: vertical bars colored by amplitude
//! - Neon Tunnel: concentric squares pulsing with the bass
//! - Waveform: zig-zag line through the band amplitudes
//! - Circle Pulse: central disc sized by sub-bass energy
//! - Kaleidoscope: radial pattern modulated per ring
//! - Plasma Fluid: interfering sines shifted by the bass
//! - Cosmic Particles: starfield accelerating with the bass

mod bars;
mod cpu;
mod kaleidoscope;
mod particles;
mod plasma;
mod pulse;
mod tunnel;
mod waveform;

pub use cpu::CpuBackend;
pub use particles::{Particle, ParticleSystem};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which backend family renders a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    Cpu,
    Gpu,
}

/// Available visualizer modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisualizerMode {
    #[serde(rename = "Bars Spectrum")]
    Bars,
    #[serde(rename = "Neon Tunnel")]
    NeonTunnel,
    #[serde(rename = "Waveform")]
    Waveform,
    #[serde(rename = "Circle Pulse")]
    CirclePulse,
    #[serde(rename = "Kaleidoscope")]
    Kaleidoscope,
    #[serde(rename = "Plasma Fluid")]
    PlasmaFluid,
    #[serde(rename = "Cosmic Particles")]
    CosmicParticles,
    #[serde(rename = "GPU Fractal")]
    GpuFractal,
    #[serde(rename = "Neural Liquid")]
    NeuralLiquid,
    #[serde(rename = "Hyperwarp")]
    Hyperwarp,
    #[serde(rename = "Electric Storm")]
    ElectricStorm,
    #[serde(rename = "Rainbow Flow")]
    RainbowFlow,
    #[serde(rename = "Audio Matrix")]
    AudioMatrix,
}

impl VisualizerMode {
    const ALL: [VisualizerMode; 13] = [
        Self::Bars,
        Self::NeonTunnel,
        Self::Waveform,
        Self::CirclePulse,
        Self::Kaleidoscope,
        Self::PlasmaFluid,
        Self::CosmicParticles,
        Self::GpuFractal,
        Self::NeuralLiquid,
        Self::Hyperwarp,
        Self::ElectricStorm,
        Self::RainbowFlow,
        Self::AudioMatrix,
    ];

    /// Every registered mode, CPU modes first.
    pub fn all() -> &'static [VisualizerMode] {
        &Self::ALL
    }

    pub fn cpu_modes() -> impl Iterator<Item = VisualizerMode> {
        Self::ALL.into_iter().filter(|m| m.kind() == RenderKind::Cpu)
    }

    pub fn gpu_modes() -> impl Iterator<Item = VisualizerMode> {
        Self::ALL.into_iter().filter(|m| m.kind() == RenderKind::Gpu)
    }

    /// Parse a display name or slug, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name().to_lowercase() == wanted || m.slug() == wanted)
    }

    /// Parse a name, falling back to Bars Spectrum for unknown names.
    pub fn from_name_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or_else(|| {
            log::warn!("Unknown visualizer mode {:?}, using {}", s, Self::Bars);
            Self::Bars
        })
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bars => "Bars Spectrum",
            Self::NeonTunnel => "Neon Tunnel",
            Self::Waveform => "Waveform",
            Self::CirclePulse => "Circle Pulse",
            Self::Kaleidoscope => "Kaleidoscope",
            Self::PlasmaFluid => "Plasma Fluid",
            Self::CosmicParticles => "Cosmic Particles",
            Self::GpuFractal => "GPU Fractal",
            Self::NeuralLiquid => "Neural Liquid",
            Self::Hyperwarp => "Hyperwarp",
            Self::ElectricStorm => "Electric Storm",
            Self::RainbowFlow => "Rainbow Flow",
            Self::AudioMatrix => "Audio Matrix",
        }
    }

    /// Command-line friendly name.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::NeonTunnel => "neon-tunnel",
            Self::Waveform => "waveform",
            Self::CirclePulse => "circle-pulse",
            Self::Kaleidoscope => "kaleidoscope",
            Self::PlasmaFluid => "plasma-fluid",
            Self::CosmicParticles => "cosmic-particles",
            Self::GpuFractal => "gpu-fractal",
            Self::NeuralLiquid => "neural-liquid",
            Self::Hyperwarp => "hyperwarp",
            Self::ElectricStorm => "electric-storm",
            Self::RainbowFlow => "rainbow-flow",
            Self::AudioMatrix => "audio-matrix",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Bars => "Vertical bars colored green, yellow, red by level",
            Self::NeonTunnel => "Concentric neon squares pulsing with the bass",
            Self::Waveform => "Zig-zag line through the band levels",
            Self::CirclePulse => "Central disc beating with the sub-bass",
            Self::Kaleidoscope => "Rotating radial pattern, one ring per band",
            Self::PlasmaFluid => "Interfering sines tinted by the bass",
            Self::CosmicParticles => "Starfield that speeds up on the bass",
            Self::GpuFractal => "Audio-driven Julia set",
            Self::NeuralLiquid => "Domain-warped liquid noise",
            Self::Hyperwarp => "Radial star streaks rushing outward",
            Self::ElectricStorm => "Branching lightning over a dark sky",
            Self::RainbowFlow => "Flowing hue bands bent by the spectrum",
            Self::AudioMatrix => "Falling glyph columns lit by their band",
        }
    }

    pub fn kind(&self) -> RenderKind {
        match self {
            Self::Bars
            | Self::NeonTunnel
            | Self::Waveform
            | Self::CirclePulse
            | Self::Kaleidoscope
            | Self::PlasmaFluid
            | Self::CosmicParticles => RenderKind::Cpu,
            Self::GpuFractal
            | Self::NeuralLiquid
            | Self::Hyperwarp
            | Self::ElectricStorm
            | Self::RainbowFlow
            | Self::AudioMatrix => RenderKind::Gpu,
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.kind() == RenderKind::Gpu
    }
}

impl fmt::Display for VisualizerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mean of the first `n` bands, zero for an empty vector.
pub(crate) fn band_energy(spectrum: &[f32], n: usize) -> f32 {
    band_mean(spectrum, 0, n)
}

/// Mean of bands `start..end`, clipped to the vector.
pub(crate) fn band_mean(spectrum: &[f32], start: usize, end: usize) -> f32 {
    let end = end.min(spectrum.len());
    if start >= end {
        return 0.0;
    }
    spectrum[start..end].iter().sum::<f32>() / (end - start) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for mode in VisualizerMode::all() {
            assert_eq!(VisualizerMode::from_str(mode.name()), Some(*mode));
            assert_eq!(VisualizerMode::from_str(mode.slug()), Some(*mode));
        }
    }

    #[test]
    fn test_unknown_name_falls_back_to_bars() {
        assert_eq!(VisualizerMode::from_str("Manim"), None);
        assert_eq!(
            VisualizerMode::from_name_or_default("Manim"),
            VisualizerMode::Bars
        );
    }

    #[test]
    fn test_kind_partition() {
        assert_eq!(VisualizerMode::cpu_modes().count(), 7);
        assert_eq!(VisualizerMode::gpu_modes().count(), 6);
        assert!(VisualizerMode::Hyperwarp.is_gpu());
        assert!(!VisualizerMode::PlasmaFluid.is_gpu());
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&VisualizerMode::NeonTunnel).unwrap();
        assert_eq!(json, "\"Neon Tunnel\"");
        let pool: Vec<VisualizerMode> =
            serde_json::from_str(r#"["Bars Spectrum", "Audio Matrix"]"#).unwrap();
        assert_eq!(pool, vec![VisualizerMode::Bars, VisualizerMode::AudioMatrix]);
    }

    #[test]
    fn test_band_mean_clips() {
        assert_eq!(band_energy(&[], 5), 0.0);
        assert!((band_mean(&[1.0, 0.0, 0.5], 1, 10) - 0.25).abs() < 1e-6);
    }
}
