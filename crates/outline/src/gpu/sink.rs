use wgpu::util::DeviceExt;

use crate::buffers::{AllocError, BufferAllocator, BufferDescriptor, BufferHandle};
use crate::command::{ClearFlag, CommandSink, RenderTarget, TargetSetup, UniformValue};
use crate::filter::{DrawingSettings, RenderableSet};
use crate::pass::ShaderPass;
use crate::registry::PropertyId;

use super::allocator::{texture_format, GpuAllocator, STENCIL_FORMAT};
use super::context::GpuContext;
use super::mesh::{CameraTargets, GpuMesh, DEPTH_FORMAT};
use super::program::{OutlineProgram, PipelineKey, ProgramPass, INTERIOR_STENCIL_REF};
use super::uniforms::OutlineUniforms;

/// Colour attachment resolved from a [`RenderTarget`].
struct Attachment<'v> {
    view: &'v wgpu::TextureView,
    resolve: Option<&'v wgpu::TextureView>,
    stencil: Option<&'v wgpu::TextureView>,
    format: wgpu::TextureFormat,
    samples: u32,
}

/// Encodes one camera's outline commands into a single command buffer.
pub struct GpuFrame<'f, 'a> {
    context: &'a GpuContext,
    allocator: &'f mut GpuAllocator<'a>,
    program: &'f mut OutlineProgram,
    camera: &'f CameraTargets,
    encoder: wgpu::CommandEncoder,
    uniforms: OutlineUniforms,
    uniform_buffer: wgpu::Buffer,
    globals: wgpu::BindGroup,
}

impl<'f, 'a> GpuFrame<'f, 'a> {
    pub fn new(
        context: &'a GpuContext,
        allocator: &'f mut GpuAllocator<'a>,
        program: &'f mut OutlineProgram,
        camera: &'f CameraTargets,
    ) -> Self {
        let device = &context.device;
        let uniforms = OutlineUniforms::default();
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("outline uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let globals = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("outline globals"),
            layout: &program.globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("outline encoder"),
        });
        Self {
            context,
            allocator,
            program,
            camera,
            encoder,
            uniforms,
            uniform_buffer,
            globals,
        }
    }

    pub fn submit(self) -> wgpu::SubmissionIndex {
        self.context.queue.submit(Some(self.encoder.finish()))
    }
}

fn attachment<'v>(
    allocator: &'v GpuAllocator<'_>,
    camera: &'v CameraTargets,
    target: RenderTarget,
) -> Option<Attachment<'v>> {
    match target {
        RenderTarget::Buffer(handle) => allocator.get(handle).map(|buffer| Attachment {
            view: &buffer.attachment,
            resolve: buffer.resolve_target(),
            stencil: buffer.stencil_view(),
            format: texture_format(buffer.descriptor.format),
            samples: buffer.descriptor.sample_count,
        }),
        // Full-screen passes write the resolved colour directly.
        RenderTarget::CameraColor => Some(Attachment {
            view: &camera.color_view,
            resolve: None,
            stencil: None,
            format: texture_format(camera.target.format),
            samples: 1,
        }),
        RenderTarget::CameraDepth => None,
    }
}

fn sampled<'v>(
    allocator: &'v GpuAllocator<'_>,
    camera: &'v CameraTargets,
    source: RenderTarget,
) -> Option<&'v wgpu::TextureView> {
    match source {
        RenderTarget::Buffer(handle) => allocator.get(handle).map(|buffer| buffer.sampled_view()),
        RenderTarget::CameraColor => Some(&camera.color_view),
        RenderTarget::CameraDepth => None,
    }
}

impl BufferAllocator for GpuFrame<'_, '_> {
    fn acquire(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, AllocError> {
        self.allocator.acquire(descriptor)
    }

    fn release(&mut self, handle: BufferHandle) {
        self.allocator.release(handle);
    }
}

impl CommandSink for GpuFrame<'_, '_> {
    type Renderable = GpuMesh;

    fn set_global(&mut self, property: PropertyId, value: UniformValue) {
        if !self.uniforms.apply(property, value) {
            tracing::debug!(%property, "global has no slot in the outline uniforms; ignored");
        }
    }

    fn draw_renderers(
        &mut self,
        target: &TargetSetup,
        renderables: RenderableSet<'_, GpuMesh>,
        settings: &DrawingSettings,
    ) {
        if !settings.pass.is_geometry() {
            tracing::warn!(pass = %settings.pass, "full-screen pass used for a geometry draw; ignored");
            return;
        }
        let Some(color) = attachment(self.allocator, self.camera, target.color) else {
            tracing::warn!(color = %target.color, "draw into unknown target ignored");
            return;
        };

        let stencil_load = if target.clear == ClearFlag::ColorStencil {
            wgpu::LoadOp::Clear(0)
        } else {
            wgpu::LoadOp::Load
        };
        let (depth_stencil, depth_stencil_attachment) = match settings.pass {
            ShaderPass::InteriorStencil => match color.stencil {
                Some(view) => (
                    Some(STENCIL_FORMAT),
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: None,
                        stencil_ops: Some(wgpu::Operations {
                            load: stencil_load,
                            store: wgpu::StoreOp::Store,
                        }),
                    }),
                ),
                None => {
                    tracing::warn!(color = %target.color, "interior stencil target has no stencil plane");
                    (None, None)
                }
            },
            _ if target.depth == Some(RenderTarget::CameraDepth) => (
                Some(DEPTH_FORMAT),
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.camera.depth_view,
                    depth_ops: None,
                    stencil_ops: None,
                }),
            ),
            _ => (None, None),
        };

        let key = PipelineKey {
            pass: ProgramPass::Outline(settings.pass),
            color_format: color.format,
            samples: color.samples,
            depth_stencil,
        };
        let pipeline = self.program.pipeline(&self.context.device, key);
        let load = match target.clear {
            ClearFlag::None => wgpu::LoadOp::Load,
            ClearFlag::Color | ClearFlag::ColorStencil => {
                wgpu::LoadOp::Clear(target.clear_color.to_wgpu())
            }
        };

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(key.pass.fragment_entry()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color.view,
                depth_slice: None,
                resolve_target: color.resolve,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_stencil_reference(INTERIOR_STENCIL_REF);
        for mesh in renderables.sorted(settings.sorting) {
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.draw(0..mesh.vertex_count, 0..1);
        }
    }

    fn blit(&mut self, source: RenderTarget, destination: RenderTarget, pass: ShaderPass) {
        if pass.is_geometry() {
            tracing::warn!(%pass, "geometry pass used for a blit; ignored");
            return;
        }
        let Some(source_view) = sampled(self.allocator, self.camera, source) else {
            tracing::warn!(%source, "blit from unknown source ignored");
            return;
        };
        let Some(dest) = attachment(self.allocator, self.camera, destination) else {
            tracing::warn!(%destination, "blit into unknown target ignored");
            return;
        };
        let device = &self.context.device;

        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniform staging"),
            contents: bytemuck::bytes_of(&self.uniforms),
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        self.encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &self.uniform_buffer,
            0,
            OutlineUniforms::SIZE,
        );

        let source_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("outline source"),
            layout: &self.program.source_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(source_view),
            }],
        });

        let stencil = match pass {
            ShaderPass::JfaOutline => dest.stencil,
            _ => None,
        };
        let key = PipelineKey {
            pass: ProgramPass::Outline(pass),
            color_format: dest.format,
            samples: dest.samples,
            depth_stencil: stencil.map(|_| STENCIL_FORMAT),
        };
        let pipeline = self.program.pipeline(device, key);

        let mut render = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(key.pass.fragment_entry()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dest.view,
                depth_slice: None,
                resolve_target: dest.resolve,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: stencil.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: None,
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render.set_pipeline(pipeline);
        render.set_stencil_reference(INTERIOR_STENCIL_REF);
        render.set_bind_group(0, &self.globals, &[]);
        render.set_bind_group(1, &source_group, &[]);
        render.draw(0..3, 0..1);
    }

    fn begin_sample(&mut self, name: &'static str) {
        self.encoder.push_debug_group(name);
    }

    fn end_sample(&mut self, _name: &'static str) {
        self.encoder.pop_debug_group();
    }
}
