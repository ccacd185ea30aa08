use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::filter::{Renderable, RenderableId, ShaderTag};
use crate::soft::SoftRenderable;
use crate::types::{CameraTarget, LinearColor};

use super::allocator::texture_format;
use super::context::GpuContext;
use super::program::{OutlineProgram, PipelineKey, ProgramPass};

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// View depth mapped to clip depth 1.0.
pub const FAR_PLANE: f32 = 100.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

unsafe impl Zeroable for Vertex {}
unsafe impl Pod for Vertex {}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Two clip-space triangles covering a normalized top-left rectangle.
pub(crate) fn quad(rect: [f32; 4], depth: f32, color: LinearColor) -> [Vertex; 6] {
    let [x, y, w, h] = rect;
    let (left, right) = (x * 2.0 - 1.0, (x + w) * 2.0 - 1.0);
    let (top, bottom) = (1.0 - y * 2.0, 1.0 - (y + h) * 2.0);
    let z = (depth / FAR_PLANE).clamp(0.0, 1.0);
    let color = color.to_array();
    let v = |x, y| Vertex {
        position: [x, y, z],
        color,
    };
    [
        v(left, top),
        v(left, bottom),
        v(right, bottom),
        v(left, top),
        v(right, bottom),
        v(right, top),
    ]
}

/// A scene rectangle uploaded to the GPU.
pub struct GpuMesh {
    pub id: RenderableId,
    pub layer: u8,
    pub tags: Vec<ShaderTag>,
    pub queue: i32,
    pub depth: f32,
    pub(crate) vertices: wgpu::Buffer,
    pub(crate) vertex_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, object: &SoftRenderable) -> Self {
        let vertices = quad(object.rect, object.depth, object.albedo);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("scene mesh"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            id: object.id,
            layer: object.layer,
            tags: object.tags.clone(),
            queue: object.queue,
            depth: object.depth,
            vertices: buffer,
            vertex_count: vertices.len() as u32,
        }
    }
}

impl Renderable for GpuMesh {
    fn id(&self) -> RenderableId {
        self.id
    }

    fn layer(&self) -> u8 {
        self.layer
    }

    fn shader_tags(&self) -> &[ShaderTag] {
        &self.tags
    }

    fn render_queue(&self) -> i32 {
        self.queue
    }

    fn view_depth(&self) -> f32 {
        self.depth
    }
}

/// Camera colour and depth owned by the host.
///
/// `color` is always single-sampled; with MSAA the scene renders into `msaa`
/// and resolves into it. Depth keeps the camera's sample count so the
/// silhouette pass can test against it.
pub struct CameraTargets {
    pub target: CameraTarget,
    pub color: wgpu::Texture,
    pub(crate) color_view: wgpu::TextureView,
    pub(crate) msaa: Option<(wgpu::Texture, wgpu::TextureView)>,
    pub(crate) _depth: wgpu::Texture,
    pub(crate) depth_view: wgpu::TextureView,
}

impl CameraTargets {
    pub fn new(context: &GpuContext, target: CameraTarget) -> Self {
        let device = &context.device;
        let size = wgpu::Extent3d {
            width: target.width,
            height: target.height,
            depth_or_array_layers: 1,
        };
        let format = texture_format(target.format);
        let samples = target.msaa_samples();

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("camera color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let msaa = (samples > 1).then(|| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("camera color msaa"),
                size,
                mip_level_count: 1,
                sample_count: samples,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("camera depth"),
            size,
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            target,
            color,
            color_view,
            msaa,
            _depth: depth,
            depth_view,
        }
    }

    pub fn samples(&self) -> u32 {
        self.target.msaa_samples()
    }

    /// Host opaque pass: clears colour and depth, then draws every mesh.
    pub fn draw_scene(
        &self,
        context: &GpuContext,
        program: &mut OutlineProgram,
        meshes: &[GpuMesh],
        clear: LinearColor,
    ) {
        let key = PipelineKey {
            pass: ProgramPass::Scene,
            color_format: texture_format(self.target.format),
            samples: self.samples(),
            depth_stencil: Some(DEPTH_FORMAT),
        };
        let pipeline = program.pipeline(&context.device, key);
        let (view, resolve_target) = match &self.msaa {
            Some((_, msaa)) => (msaa, Some(&self.color_view)),
            None => (&self.color_view, None),
        };

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            for mesh in meshes {
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.draw(0..mesh.vertex_count, 0..1);
            }
        }
        context.queue.submit(Some(encoder.finish()));
    }
}
