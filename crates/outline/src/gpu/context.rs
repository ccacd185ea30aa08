use anyhow::{Context as AnyhowContext, Result};
use wgpu::TextureFormatFeatureFlags;

use crate::buffers::BufferFormat;

use super::allocator::texture_format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Options for creating a headless device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuOptions {
    pub power: GpuPowerPreference,
    /// Prefer a software adapter, useful on machines without a GPU.
    pub force_fallback_adapter: bool,
}

/// What the adapter reports for one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSupport {
    pub renderable: bool,
    pub resolvable: bool,
    pub sample_counts: Vec<u32>,
    pub missing_features: wgpu::Features,
}

/// Adapter, device and queue without a presentation surface.
pub struct GpuContext {
    _instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    pub is_software: bool,
}

impl GpuContext {
    pub fn new(options: GpuOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: options.force_fallback_adapter,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        let is_software = info.device_type == wgpu::DeviceType::Cpu;
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            is_software,
            "selected GPU adapter"
        );

        // Optional features are requested when present; allocation reports
        // anything still missing per format instead of failing here.
        let wanted = wgpu::Features::TEXTURE_FORMAT_16BIT_NORM
            | wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        let required_features = adapter.features() & wanted;
        if !required_features.contains(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM) {
            tracing::warn!("adapter lacks 16-bit normalized textures; nearest-point buffers will be unavailable");
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("outline device"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
            adapter_name: info.name,
            is_software,
        })
    }

    pub fn format_support(&self, format: BufferFormat) -> FormatSupport {
        let format = texture_format(format);
        let missing_features = format.required_features() - self.device.features();
        let features = self.adapter.get_texture_format_features(format);
        let mut sample_counts = features.flags.supported_sample_counts();
        if !sample_counts.contains(&1) {
            sample_counts.push(1);
        }
        sample_counts.sort_unstable();
        sample_counts.dedup();
        FormatSupport {
            renderable: features
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
            resolvable: features
                .flags
                .contains(TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE),
            sample_counts,
            missing_features,
        }
    }

    /// Largest supported sample count not above `requested` for a camera format.
    pub fn negotiate_samples(&self, format: BufferFormat, requested: u32) -> u32 {
        let support = self.format_support(format);
        let requested = requested.max(1);
        if self.is_software && requested > 1 {
            tracing::warn!(requested, "software rasterizer detected; disabling MSAA");
            return 1;
        }
        if requested > 1 && !support.resolvable {
            tracing::warn!(%format, "format cannot resolve multisampled targets; disabling MSAA");
            return 1;
        }
        let chosen = fallback_sample_count(&support.sample_counts, requested);
        if chosen != requested {
            tracing::warn!(
                requested,
                chosen,
                supported = ?support.sample_counts,
                "requested MSAA sample count not supported; falling back"
            );
        }
        chosen
    }
}

pub(crate) fn fallback_sample_count(supported: &[u32], requested: u32) -> u32 {
    if supported.contains(&requested) {
        return requested;
    }
    supported
        .iter()
        .copied()
        .filter(|&count| count <= requested)
        .max()
        .unwrap_or(1)
}
