use std::collections::HashMap;

use crate::pass::ShaderPass;

use super::mesh::Vertex;

const SOURCE: &str = include_str!("../shaders/outline.wgsl");

pub(crate) const INTERIOR_STENCIL_REF: u32 = 1;

/// Everything a render pipeline depends on besides the pass itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub pass: ProgramPass,
    pub color_format: wgpu::TextureFormat,
    pub samples: u32,
    pub depth_stencil: Option<wgpu::TextureFormat>,
}

/// A contract pass, or the host opaque pass used by the demo scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramPass {
    Outline(ShaderPass),
    Scene,
}

impl ProgramPass {
    pub fn fragment_entry(self) -> &'static str {
        match self {
            Self::Scene => "fs_scene",
            Self::Outline(pass) => match pass {
                ShaderPass::InteriorStencil => "fs_interior_stencil",
                ShaderPass::SilhouetteFill => "fs_silhouette",
                ShaderPass::JfaInit => "fs_jfa_init",
                ShaderPass::JfaFlood => "fs_jfa_flood",
                ShaderPass::JfaFloodSingleAxis => "fs_jfa_flood_axis",
                ShaderPass::JfaOutline => "fs_jfa_outline",
                ShaderPass::BlitToTarget => "fs_blit",
            },
        }
    }

    pub fn is_geometry(self) -> bool {
        match self {
            Self::Scene => true,
            Self::Outline(pass) => pass.is_geometry(),
        }
    }

    pub fn blend(self) -> Option<wgpu::BlendState> {
        match self {
            Self::Outline(ShaderPass::BlitToTarget) => Some(wgpu::BlendState::ALPHA_BLENDING),
            _ => None,
        }
    }

    pub fn write_mask(self) -> wgpu::ColorWrites {
        match self {
            Self::Outline(ShaderPass::InteriorStencil) => wgpu::ColorWrites::empty(),
            _ => wgpu::ColorWrites::ALL,
        }
    }

    pub fn depth_stencil(self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        let stencil_face = |compare, pass_op| wgpu::StencilFaceState {
            compare,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op,
        };
        let (depth_write_enabled, depth_compare, stencil) = match self {
            Self::Scene => (
                true,
                wgpu::CompareFunction::Less,
                wgpu::StencilState::default(),
            ),
            Self::Outline(ShaderPass::SilhouetteFill) => (
                false,
                wgpu::CompareFunction::LessEqual,
                wgpu::StencilState::default(),
            ),
            Self::Outline(ShaderPass::InteriorStencil) => {
                let face = stencil_face(
                    wgpu::CompareFunction::Always,
                    wgpu::StencilOperation::Replace,
                );
                (
                    false,
                    wgpu::CompareFunction::Always,
                    wgpu::StencilState {
                        front: face,
                        back: face,
                        read_mask: 0xff,
                        write_mask: 0xff,
                    },
                )
            }
            Self::Outline(_) => {
                let face = stencil_face(
                    wgpu::CompareFunction::NotEqual,
                    wgpu::StencilOperation::Keep,
                );
                (
                    false,
                    wgpu::CompareFunction::Always,
                    wgpu::StencilState {
                        front: face,
                        back: face,
                        read_mask: 0xff,
                        write_mask: 0,
                    },
                )
            }
        };
        wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil,
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// The compiled outline program and its lazily built pipelines.
pub struct OutlineProgram {
    module: wgpu::ShaderModule,
    pub(crate) globals_layout: wgpu::BindGroupLayout,
    pub(crate) source_layout: wgpu::BindGroupLayout,
    geometry_layout: wgpu::PipelineLayout,
    fullscreen_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl OutlineProgram {
    pub const NAME: &'static str = "builtin";

    pub fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("outline program"),
            source: wgpu::ShaderSource::Wgsl(SOURCE.into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline globals layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let source_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("outline source layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let geometry_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("outline geometry layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });
        let fullscreen_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("outline fullscreen layout"),
            bind_group_layouts: &[&globals_layout, &source_layout],
            push_constant_ranges: &[],
        });

        Self {
            module,
            globals_layout,
            source_layout,
            geometry_layout,
            fullscreen_layout,
            pipelines: HashMap::new(),
        }
    }

    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub(crate) fn pipeline(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
    ) -> &wgpu::RenderPipeline {
        let module = &self.module;
        let geometry_layout = &self.geometry_layout;
        let fullscreen_layout = &self.fullscreen_layout;
        self.pipelines.entry(key).or_insert_with(|| {
            tracing::debug!(?key, "building outline pipeline");
            let geometry = key.pass.is_geometry();
            let vertex_buffers = [Vertex::layout()];
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(key.pass.fragment_entry()),
                layout: Some(if geometry {
                    geometry_layout
                } else {
                    fullscreen_layout
                }),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(if geometry {
                        "vs_geometry"
                    } else {
                        "vs_fullscreen"
                    }),
                    buffers: if geometry { &vertex_buffers[..] } else { &[] },
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: key.depth_stencil.map(|format| key.pass.depth_stencil(format)),
                multisample: wgpu::MultisampleState {
                    count: key.samples,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(key.pass.fragment_entry()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.color_format,
                        blend: key.pass.blend(),
                        write_mask: key.pass.write_mask(),
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        })
    }
}
