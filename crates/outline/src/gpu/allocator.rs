use std::collections::HashMap;

use crate::buffers::{AllocError, BufferAllocator, BufferDescriptor, BufferFormat, BufferHandle};

use super::context::GpuContext;

pub(crate) const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Stencil8;

pub fn texture_format(format: BufferFormat) -> wgpu::TextureFormat {
    match format {
        BufferFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        BufferFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        BufferFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        BufferFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        BufferFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        BufferFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        BufferFormat::Rg16Snorm => wgpu::TextureFormat::Rg16Snorm,
    }
}

/// One temporary render target and its optional attachments.
pub(crate) struct GpuBuffer {
    pub descriptor: BufferDescriptor,
    /// Render attachment; multisampled when the descriptor asks for it.
    pub _texture: wgpu::Texture,
    pub attachment: wgpu::TextureView,
    /// Single-sample copy the multisampled attachment resolves into.
    pub resolve: Option<(wgpu::Texture, wgpu::TextureView)>,
    pub stencil: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl GpuBuffer {
    /// View to bind when a later pass samples this buffer.
    pub fn sampled_view(&self) -> &wgpu::TextureView {
        self.resolve
            .as_ref()
            .map(|(_, view)| view)
            .unwrap_or(&self.attachment)
    }

    pub fn resolve_target(&self) -> Option<&wgpu::TextureView> {
        self.resolve.as_ref().map(|(_, view)| view)
    }

    pub fn stencil_view(&self) -> Option<&wgpu::TextureView> {
        self.stencil.as_ref().map(|(_, view)| view)
    }
}

/// Pooled texture allocator.
///
/// Released buffers go back to a free list and are handed out again for an
/// identical descriptor, so steady-state frames create no textures.
pub struct GpuAllocator<'a> {
    context: &'a GpuContext,
    live: HashMap<BufferHandle, GpuBuffer>,
    free: Vec<GpuBuffer>,
    next_handle: u64,
}

impl<'a> GpuAllocator<'a> {
    pub fn new(context: &'a GpuContext) -> Self {
        Self {
            context,
            live: HashMap::new(),
            free: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn get(&self, handle: BufferHandle) -> Option<&GpuBuffer> {
        self.live.get(&handle)
    }

    fn check(&self, descriptor: &BufferDescriptor) -> Result<(), AllocError> {
        let support = self.context.format_support(descriptor.format);
        if !support.missing_features.is_empty() {
            return Err(AllocError::UnsupportedFormat {
                format: descriptor.format,
                reason: format!("requires device features {:?}", support.missing_features),
            });
        }
        if !support.renderable {
            return Err(AllocError::UnsupportedFormat {
                format: descriptor.format,
                reason: "not usable as a render attachment".to_string(),
            });
        }
        if descriptor.is_multisampled()
            && (!support.sample_counts.contains(&descriptor.sample_count) || !support.resolvable)
        {
            return Err(AllocError::UnsupportedSampleCount {
                format: descriptor.format,
                samples: descriptor.sample_count,
            });
        }
        Ok(())
    }

    fn create(&self, descriptor: &BufferDescriptor) -> GpuBuffer {
        let device = &self.context.device;
        let size = wgpu::Extent3d {
            width: descriptor.width,
            height: descriptor.height,
            depth_or_array_layers: 1,
        };
        let format = texture_format(descriptor.format);
        let label = descriptor.semantic.property().name();
        let single_usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: descriptor.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: if descriptor.is_multisampled() {
                wgpu::TextureUsages::RENDER_ATTACHMENT
            } else {
                single_usage
            },
            view_formats: &[],
        });
        let attachment = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let resolve = descriptor.is_multisampled().then(|| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: single_usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        let stencil = descriptor.stencil.then(|| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("outline stencil"),
                size,
                mip_level_count: 1,
                sample_count: descriptor.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: STENCIL_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        GpuBuffer {
            descriptor: *descriptor,
            _texture: texture,
            attachment,
            resolve,
            stencil,
        }
    }
}

impl BufferAllocator for GpuAllocator<'_> {
    fn acquire(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, AllocError> {
        self.check(descriptor)?;
        let buffer = match self
            .free
            .iter()
            .position(|pooled| pooled.descriptor == *descriptor)
        {
            Some(index) => self.free.swap_remove(index),
            None => self.create(descriptor),
        };
        self.next_handle += 1;
        let handle = BufferHandle::from_raw(self.next_handle);
        self.live.insert(handle, buffer);
        Ok(handle)
    }

    fn release(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.live.remove(&handle) {
            self.free.push(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_formats_map_one_to_one() {
        let formats = [
            BufferFormat::Rgba8Unorm,
            BufferFormat::Rgba8UnormSrgb,
            BufferFormat::Bgra8Unorm,
            BufferFormat::Bgra8UnormSrgb,
            BufferFormat::Rgba16Float,
            BufferFormat::R8Unorm,
            BufferFormat::Rg16Snorm,
        ];
        let mapped: Vec<_> = formats.iter().map(|f| texture_format(*f)).collect();
        for (i, a) in mapped.iter().enumerate() {
            for b in &mapped[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            texture_format(BufferFormat::Rg16Snorm).required_features(),
            wgpu::Features::TEXTURE_FORMAT_16BIT_NORM
        );
        assert!(texture_format(BufferFormat::Rgba8UnormSrgb).is_srgb());
    }
}
