//! GPU visualizer modes using wgpu.
//!
//! Renders fullscreen WGSL fragment programs into an offscreen target and
//! reads the pixels back as RGBA frames. Everything here must run on the
//! thread that created the [`GpuContext`].

pub mod context;
pub mod shader_backend;
pub mod textures;

pub use context::{ContextOptions, GpuContext, GpuError};
pub use shader_backend::{
    assemble_program, program_body, validate_wgsl, ShaderBackend, ShaderUniforms, SHADER_BANDS,
};
pub use textures::{ReadbackBuffer, RenderTarget, TARGET_FORMAT};
