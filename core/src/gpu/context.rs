//! Headless device acquisition.

use std::sync::Arc;
use wgpu::{Adapter, Backends, Device, Instance, PowerPreference, Queue};

/// Errors that can occur during GPU operations.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("Failed to map readback buffer: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("Device poll failed: {0}")]
    Poll(String),
}

/// How to pick an adapter.
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    pub backends: Backends,
    pub power_preference: PowerPreference,
    /// Retry with a software adapter when no hardware adapter matches.
    pub allow_software: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            backends: Backends::METAL | Backends::VULKAN | Backends::GL,
            power_preference: PowerPreference::HighPerformance,
            allow_software: true,
        }
    }
}

/// Device and queue for offscreen rendering.
///
/// The thread that creates the context is the one that renders with it;
/// other threads reach it through the bridge.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Arc<Adapter>,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
}

impl GpuContext {
    pub async fn new() -> Result<Self, GpuError> {
        Self::with_options(ContextOptions::default()).await
    }

    pub async fn with_options(options: ContextOptions) -> Result<Self, GpuError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let adapter = match Self::pick_adapter(&instance, options.power_preference, false).await {
            Some(adapter) => adapter,
            None if options.allow_software => {
                log::warn!("No hardware adapter, trying a software one");
                Self::pick_adapter(&instance, options.power_preference, true)
                    .await
                    .ok_or(GpuError::NoAdapter)?
            }
            None => return Err(GpuError::NoAdapter),
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pulsecast"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        let ctx = Self {
            instance,
            adapter: Arc::new(adapter),
            device: Arc::new(device),
            queue: Arc::new(queue),
        };
        log::info!("GPU adapter: {}", ctx.describe());
        Ok(ctx)
    }

    async fn pick_adapter(
        instance: &Instance,
        power_preference: PowerPreference,
        software: bool,
    ) -> Option<Adapter> {
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                force_fallback_adapter: software,
                compatible_surface: None,
            })
            .await
            .ok()
    }

    /// Blocking variant of [`new`](Self::new) for synchronous callers.
    pub fn new_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::new())
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Adapter name and backend, e.g. `"llvmpipe (Vulkan)"`.
    pub fn describe(&self) -> String {
        let info = self.adapter_info();
        format!("{} ({:?})", info.name, info.backend)
    }
}
