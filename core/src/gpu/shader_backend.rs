//! Fullscreen fragment programs rendered offscreen with wgpu.
//!
//! One program is active at a time. Switching modes rebuilds the pipeline;
//! a change of output size reallocates the render target and readback
//! buffer. Program source is checked with naga first, so a broken program
//! turns into a [`RenderError::ShaderCompile`] instead of a device error.

use std::collections::HashMap;

use image::RgbaImage;

use super::context::{GpuContext, GpuError};
use super::textures::{ReadbackBuffer, RenderTarget, TARGET_FORMAT};
use crate::modes::VisualizerMode;
use crate::render::{RenderBackend, RenderError};

const PRELUDE: &str = include_str!("shaders/common.wgsl");

/// Number of spectral bands the programs can see.
pub const SHADER_BANDS: usize = 64;

/// Uniform block shared by every program.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShaderUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub _padding: f32,
    /// Bands packed four per vec4 to satisfy uniform array stride rules.
    pub audio: [[f32; 4]; SHADER_BANDS / 4],
}

impl ShaderUniforms {
    /// Pack the first 64 bands of `spectrum`, zero filling the rest.
    pub fn new(spectrum: &[f32], width: u32, height: u32, time: f32) -> Self {
        let mut audio = [[0.0f32; 4]; SHADER_BANDS / 4];
        for (i, &v) in spectrum.iter().take(SHADER_BANDS).enumerate() {
            audio[i / 4][i % 4] = v;
        }
        Self {
            resolution: [width as f32, height as f32],
            time,
            _padding: 0.0,
            audio,
        }
    }
}

/// Fragment program body for a GPU mode.
pub fn program_body(mode: VisualizerMode) -> Option<&'static str> {
    match mode {
        VisualizerMode::GpuFractal => Some(include_str!("shaders/fractal.wgsl")),
        VisualizerMode::NeuralLiquid => Some(include_str!("shaders/liquid.wgsl")),
        VisualizerMode::Hyperwarp => Some(include_str!("shaders/hyperwarp.wgsl")),
        VisualizerMode::ElectricStorm => Some(include_str!("shaders/storm.wgsl")),
        VisualizerMode::RainbowFlow => Some(include_str!("shaders/rainbow.wgsl")),
        VisualizerMode::AudioMatrix => Some(include_str!("shaders/matrix.wgsl")),
        VisualizerMode::Bars
        | VisualizerMode::NeonTunnel
        | VisualizerMode::Waveform
        | VisualizerMode::CirclePulse
        | VisualizerMode::Kaleidoscope
        | VisualizerMode::PlasmaFluid
        | VisualizerMode::CosmicParticles => None,
    }
}

/// Prepend the shared prelude to a program body.
pub fn assemble_program(body: &str) -> String {
    format!("{PRELUDE}\n{body}")
}

/// Parse and validate WGSL, returning a readable diagnostic on failure.
pub fn validate_wgsl(source: &str) -> Result<(), String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| e.emit_to_string(source))?;
    Ok(())
}

/// Renders GPU visualizer modes on the thread that owns the context.
pub struct ShaderBackend {
    ctx: GpuContext,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Mode of the loaded program and its pipeline, or the compile error.
    active: Option<(VisualizerMode, Result<wgpu::RenderPipeline, RenderError>)>,
    target: Option<(RenderTarget, ReadbackBuffer)>,
    overrides: HashMap<VisualizerMode, String>,
}

impl ShaderBackend {
    pub fn new(ctx: GpuContext) -> Self {
        let device = &ctx.device;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("visualizer_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("visualizer_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("visualizer_uniforms"),
            size: std::mem::size_of::<ShaderUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("visualizer_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            ctx,
            pipeline_layout,
            uniform_buffer,
            bind_group,
            active: None,
            target: None,
            overrides: HashMap::new(),
        }
    }

    /// Create a context and backend on the calling thread.
    pub fn new_blocking() -> Result<Self, GpuError> {
        Ok(Self::new(GpuContext::new_blocking()?))
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Mode of the currently loaded program.
    pub fn active_mode(&self) -> Option<VisualizerMode> {
        self.active.as_ref().map(|(mode, _)| *mode)
    }

    /// Current offscreen target size.
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.target.as_ref().map(|(target, _)| target.size())
    }

    /// Replace the program body used for `mode`.
    ///
    /// Takes effect the next time the mode is loaded.
    pub fn set_program_override(&mut self, mode: VisualizerMode, body: impl Into<String>) {
        self.overrides.insert(mode, body.into());
        if self.active_mode() == Some(mode) {
            self.active = None;
        }
    }

    fn ensure_target(&mut self, width: u32, height: u32) {
        if self.target_size() == Some((width, height)) {
            return;
        }
        log::info!("Allocating {}x{} render target", width, height);
        let device = &self.ctx.device;
        self.target = Some((
            RenderTarget::new(device, "visualizer_target", width, height),
            ReadbackBuffer::new(device, width, height),
        ));
    }

    fn ensure_program(&mut self, mode: VisualizerMode) -> Result<(), RenderError> {
        if self.active_mode() != Some(mode) {
            log::info!("Loading program for {}", mode);
            let pipeline = self.build_pipeline(mode);
            if let Err(e) = &pipeline {
                log::error!("{}", e);
            }
            self.active = Some((mode, pipeline));
        }
        match &self.active {
            Some((_, Err(e))) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    fn build_pipeline(&self, mode: VisualizerMode) -> Result<wgpu::RenderPipeline, RenderError> {
        let body = match self.overrides.get(&mode) {
            Some(body) => body.as_str(),
            None => program_body(mode).ok_or(RenderError::UnsupportedMode(mode))?,
        };
        let source = assemble_program(body);
        validate_wgsl(&source).map_err(|message| RenderError::ShaderCompile { mode, message })?;

        let device = &self.ctx.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(mode.slug()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(mode.slug()),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        }))
    }
}

impl RenderBackend for ShaderBackend {
    fn try_render(
        &mut self,
        mode: VisualizerMode,
        spectrum: &[f32],
        width: u32,
        height: u32,
        time: f32,
    ) -> Result<RgbaImage, RenderError> {
        if !mode.is_gpu() {
            return Err(RenderError::UnsupportedMode(mode));
        }
        if width == 0 || height == 0 {
            return Ok(RgbaImage::new(width, height));
        }

        self.ensure_target(width, height);
        self.ensure_program(mode)?;

        let (Some((target, readback)), Some((_, Ok(pipeline)))) = (&self.target, &self.active)
        else {
            return Err(RenderError::Context("render state missing".into()));
        };

        let uniforms = ShaderUniforms::new(spectrum, width, height, time);
        self.ctx
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("visualizer_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("visualizer_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            // Fullscreen triangle generated from vertex_index
            render_pass.draw(0..3, 0..1);
        }

        readback.copy_from(&mut encoder, target);
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let pixels = readback
            .read_pixels(&self.ctx.device)
            .map_err(|e| RenderError::Readback(e.to_string()))?;
        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("pixel buffer size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_size() {
        // vec2 + f32 + pad + 16 x vec4
        assert_eq!(std::mem::size_of::<ShaderUniforms>(), 272);
    }

    #[test]
    fn test_uniform_packing_pads_short_vectors() {
        let u = ShaderUniforms::new(&[0.1, 0.2, 0.3, 0.4, 0.5], 640, 480, 2.0);
        assert_eq!(u.audio[0], [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(u.audio[1], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(u.audio[15], [0.0; 4]);
        assert_eq!(u.resolution, [640.0, 480.0]);
    }

    #[test]
    fn test_uniform_packing_truncates_long_vectors() {
        let spectrum: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let u = ShaderUniforms::new(&spectrum, 1, 1, 0.0);
        assert_eq!(u.audio[15][3], 63.0);
    }

    #[test]
    fn test_every_gpu_program_validates() {
        for mode in VisualizerMode::gpu_modes() {
            let body = program_body(mode).unwrap();
            if let Err(message) = validate_wgsl(&assemble_program(body)) {
                panic!("{} failed validation:\n{}", mode, message);
            }
        }
    }

    #[test]
    fn test_cpu_modes_have_no_program() {
        assert!(VisualizerMode::cpu_modes().all(|m| program_body(m).is_none()));
    }

    #[test]
    fn test_invalid_program_is_rejected() {
        let source = assemble_program("@fragment fn fs_main() -> @location(0) vec4<f32> { return nope; }");
        assert!(validate_wgsl(&source).is_err());
    }

    #[tokio::test]
    async fn test_render_reallocates_on_resize() {
        let ctx = match GpuContext::new().await {
            Ok(ctx) => ctx,
            Err(_) => return,
        };
        let mut backend = ShaderBackend::new(ctx);

        let frame = backend
            .try_render(VisualizerMode::RainbowFlow, &[0.5; 64], 64, 32, 1.0)
            .unwrap();
        assert_eq!(frame.dimensions(), (64, 32));
        assert_eq!(backend.target_size(), Some((64, 32)));

        let frame = backend
            .try_render(VisualizerMode::RainbowFlow, &[0.5; 64], 48, 48, 1.0)
            .unwrap();
        assert_eq!(frame.dimensions(), (48, 48));
        assert_eq!(backend.target_size(), Some((48, 48)));
    }

    #[tokio::test]
    async fn test_mode_switch_reloads_program() {
        let ctx = match GpuContext::new().await {
            Ok(ctx) => ctx,
            Err(_) => return,
        };
        let mut backend = ShaderBackend::new(ctx);
        for mode in VisualizerMode::gpu_modes() {
            backend.try_render(mode, &[0.3; 64], 32, 32, 0.5).unwrap();
            assert_eq!(backend.active_mode(), Some(mode));
        }
    }

    #[tokio::test]
    async fn test_broken_program_yields_red_fallback() {
        let ctx = match GpuContext::new().await {
            Ok(ctx) => ctx,
            Err(_) => return,
        };
        let mut backend = ShaderBackend::new(ctx);
        backend.set_program_override(VisualizerMode::Hyperwarp, "@fragment fn fs_main(");

        let err = backend
            .try_render(VisualizerMode::Hyperwarp, &[0.3; 64], 16, 16, 0.0)
            .unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { .. }));

        let frame = backend.render(VisualizerMode::Hyperwarp, &[0.3; 64], 16, 16, 0.0);
        assert_eq!(frame.get_pixel(0, 0).0, [20, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_cpu_mode_is_unsupported() {
        let ctx = match GpuContext::new().await {
            Ok(ctx) => ctx,
            Err(_) => return,
        };
        let mut backend = ShaderBackend::new(ctx);
        let err = backend
            .try_render(VisualizerMode::Bars, &[0.3; 64], 16, 16, 0.0)
            .unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedMode(VisualizerMode::Bars)));
    }
}
