//! Offscreen render target and CPU readback.

use wgpu::{Device, Texture, TextureFormat, TextureUsages, TextureView};

use super::context::GpuError;

/// Format of every offscreen target; matches the RGBA8 frames handed to the encoder.
pub const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// A render target that owns both texture and view.
/// The texture must outlive its view, so we keep them together.
pub struct RenderTarget {
    texture: Texture,
    view: TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Create a target that can be drawn to and copied back to the CPU.
    pub fn new(device: &Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Readback buffer for copying GPU texture data to CPU.
pub struct ReadbackBuffer {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row_bytes: u32,
    unpadded_row_bytes: u32,
}

impl ReadbackBuffer {
    /// Create a new readback buffer sized for the given dimensions.
    pub fn new(device: &Device, width: u32, height: u32) -> Self {
        let unpadded_row_bytes = width * 4;
        let padded_row_bytes = padded_row_bytes(width);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_buffer"),
            size: (padded_row_bytes * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            width,
            height,
            padded_row_bytes,
            unpadded_row_bytes,
        }
    }

    /// Padded bytes per row, as required by the texture copy.
    pub fn padded_row_bytes(&self) -> u32 {
        self.padded_row_bytes
    }

    /// Record a copy of `target` into this buffer.
    pub fn copy_from(&self, encoder: &mut wgpu::CommandEncoder, target: &RenderTarget) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: target.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row_bytes),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Map the buffer and return tightly packed RGBA rows.
    ///
    /// The buffer is unmapped again before returning so it can be reused for
    /// the next frame.
    pub fn read_pixels(&self, device: &Device) -> Result<Vec<u8>, GpuError> {
        let buffer_slice = self.buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GpuError::Poll(e.to_string()))?;
        receiver
            .recv()
            .map_err(|_| GpuError::Poll("map callback dropped".into()))??;

        let pixels = {
            let data = buffer_slice.get_mapped_range();
            strip_row_padding(
                &data,
                self.height,
                self.padded_row_bytes,
                self.unpadded_row_bytes,
            )
        };
        self.buffer.unmap();
        Ok(pixels)
    }
}

/// Bytes per row rounded up to the copy alignment.
pub fn padded_row_bytes(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

fn strip_row_padding(data: &[u8], height: u32, padded: u32, unpadded: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((unpadded * height) as usize);
    for row in 0..height {
        let start = (row * padded) as usize;
        pixels.extend_from_slice(&data[start..start + unpadded as usize]);
    }
    pixels
}
