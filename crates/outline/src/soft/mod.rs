//! CPU reference backend.
//!
//! [`SoftDevice`] executes the command stream on in-memory float images,
//! implementing every pass of the outline program on the CPU. It is slow and
//! exact enough to compare flood variants against each other, and it lets the
//! whole pipeline run without a GPU.

mod image;
mod kernels;
mod raster;

use std::collections::{BTreeMap, HashMap};

use ::image::{Rgba, RgbaImage};

pub use self::image::SoftImage;
pub use self::kernels::{decode, encode, is_null, NULL_POS};
pub use self::raster::{PixelRect, SUPPORTED_SAMPLE_COUNTS};

use crate::buffers::{AllocError, BufferAllocator, BufferDescriptor, BufferFormat, BufferHandle, BufferSemantic};
use crate::command::{ClearFlag, CommandSink, RenderTarget, TargetSetup, UniformValue};
use crate::filter::{DrawingSettings, Renderable, RenderableId, RenderableSet, ShaderTag};
use crate::pass::ShaderPass;
use crate::registry::{properties, PropertyId};
use crate::types::{CameraTarget, LinearColor};

const DEPTH_EPSILON: f32 = 1e-5;
const INTERIOR_STENCIL_REF: u8 = 1;

/// Screen-aligned rectangle standing in for a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftRenderable {
    pub id: RenderableId,
    pub layer: u8,
    pub tags: Vec<ShaderTag>,
    pub queue: i32,
    /// View-space depth; smaller is closer.
    pub depth: f32,
    /// Normalized `[x, y, width, height]`, origin top-left.
    pub rect: [f32; 4],
    pub albedo: LinearColor,
}

impl SoftRenderable {
    pub fn new(id: u32, layer: u8, rect: [f32; 4]) -> Self {
        Self {
            id: RenderableId(id),
            layer,
            tags: vec![ShaderTag::FORWARD],
            queue: 2000,
            depth: 1.0,
            rect,
            albedo: LinearColor::new(0.5, 0.5, 0.5, 1.0),
        }
    }

    pub fn with_tags(mut self, tags: Vec<ShaderTag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_albedo(mut self, albedo: LinearColor) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_queue(mut self, queue: i32) -> Self {
        self.queue = queue;
        self
    }
}

impl Renderable for SoftRenderable {
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

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftStats {
    pub acquired: usize,
    pub released: usize,
    pub draws: usize,
    pub blits: usize,
}

enum WriteMode {
    Replace,
    StencilNotEqual(u8),
    Blend,
}

/// In-memory camera plus temporary buffers.
#[derive(Debug)]
pub struct SoftDevice {
    camera: CameraTarget,
    color: SoftImage,
    depth: Vec<f32>,
    buffers: BTreeMap<BufferHandle, (BufferSemantic, SoftImage)>,
    globals: HashMap<PropertyId, UniformValue>,
    next_handle: u64,
    rejected: Vec<BufferFormat>,
    capture: bool,
    captured: BTreeMap<BufferSemantic, SoftImage>,
    stats: SoftStats,
}

impl SoftDevice {
    pub fn new(camera: CameraTarget) -> Self {
        let samples = camera.msaa_samples();
        let color = SoftImage::new(camera.width, camera.height, samples, BufferFormat::Rgba16Float);
        let depth = vec![f32::INFINITY; camera.width as usize * camera.height as usize * samples as usize];
        Self {
            camera,
            color,
            depth,
            buffers: BTreeMap::new(),
            globals: HashMap::new(),
            next_handle: 0,
            rejected: Vec::new(),
            capture: false,
            captured: BTreeMap::new(),
            stats: SoftStats::default(),
        }
    }

    pub fn reject_format(mut self, format: BufferFormat) -> Self {
        self.rejected.push(format);
        self
    }

    /// Keeps a copy of each buffer's final contents when it is released.
    pub fn capture_released(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn camera(&self) -> &CameraTarget {
        &self.camera
    }

    pub fn camera_color(&self) -> &SoftImage {
        &self.color
    }

    pub fn captured(&self, semantic: BufferSemantic) -> Option<&SoftImage> {
        self.captured.get(&semantic)
    }

    pub fn global(&self, property: PropertyId) -> Option<UniformValue> {
        self.globals.get(&property).copied()
    }

    pub fn stats(&self) -> SoftStats {
        self.stats
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Clears camera colour to `color` and depth to the far plane.
    pub fn clear_camera(&mut self, color: LinearColor) {
        self.color.clear_color(color.to_array());
        self.depth.fill(f32::INFINITY);
    }

    /// Host opaque pass: draws every object's albedo with a less-than depth test.
    pub fn draw_scene(&mut self, scene: &[SoftRenderable]) {
        let (width, height, samples) = (self.color.width(), self.color.height(), self.color.samples());
        for object in scene {
            let rect = PixelRect::from_normalized(object.rect, width, height);
            let albedo = object.albedo.to_array();
            let color = &mut self.color;
            let depth = &mut self.depth;
            rect.for_each_sample(width, height, samples, |x, y, sample| {
                let index = sample_index(width, samples, x, y, sample);
                if object.depth < depth[index] {
                    depth[index] = object.depth;
                    color.write_sample(x, y, sample, albedo);
                }
            });
        }
    }

    /// Resolves the camera colour into an 8-bit image in the camera's encoding.
    pub fn to_rgba8(&self) -> RgbaImage {
        let srgb = self.camera.format.is_srgb();
        let resolved = self.color.resolve();
        let width = self.color.width();
        RgbaImage::from_fn(self.color.width(), self.color.height(), |x, y| {
            let texel = resolved[(y * width + x) as usize];
            let encode = |value: f32| {
                let value = if srgb {
                    self::image::linear_to_srgb(value)
                } else {
                    value.clamp(0.0, 1.0)
                };
                (value * 255.0).round() as u8
            };
            Rgba([
                encode(texel[0]),
                encode(texel[1]),
                encode(texel[2]),
                (texel[3].clamp(0.0, 1.0) * 255.0).round() as u8,
            ])
        })
    }

    fn global_vec(&self, property: PropertyId) -> [f32; 4] {
        self.global(property)
            .map(UniformValue::to_vec4)
            .unwrap_or_default()
    }

    fn image(&self, target: RenderTarget) -> Option<&SoftImage> {
        match target {
            RenderTarget::Buffer(handle) => self.buffers.get(&handle).map(|(_, image)| image),
            RenderTarget::CameraColor => Some(&self.color),
            RenderTarget::CameraDepth => None,
        }
    }

    fn image_mut(&mut self, target: RenderTarget) -> Option<&mut SoftImage> {
        match target {
            RenderTarget::Buffer(handle) => self.buffers.get_mut(&handle).map(|(_, image)| image),
            RenderTarget::CameraColor => Some(&mut self.color),
            RenderTarget::CameraDepth => None,
        }
    }

    fn shade(&self, source: &SoftImage, pass: ShaderPass, x: u32, y: u32, size: [f32; 2]) -> [f32; 4] {
        let props = properties();
        match pass {
            ShaderPass::JfaInit => {
                let [ex, ey] = kernels::jfa_init(source, x, y, size);
                [ex, ey, 0.0, 1.0]
            }
            ShaderPass::JfaFlood => {
                let step = self.global_vec(props.step_width)[0];
                let [ex, ey] = kernels::jfa_flood(source, x, y, step);
                [ex, ey, 0.0, 1.0]
            }
            ShaderPass::JfaFloodSingleAxis => {
                let [ax, ay, _, _] = self.global_vec(props.axis_width);
                let [ex, ey] = kernels::jfa_flood_axis(source, x, y, [ax, ay]);
                [ex, ey, 0.0, 1.0]
            }
            ShaderPass::JfaOutline => {
                let color = self.global_vec(props.outline_color);
                let width = self.global_vec(props.outline_width)[0];
                kernels::jfa_outline(source, x, y, color, width)
            }
            ShaderPass::BlitToTarget => source.load(x as i32, y as i32),
            ShaderPass::InteriorStencil | ShaderPass::SilhouetteFill => [0.0; 4],
        }
    }
}

fn sample_index(width: u32, samples: u32, x: u32, y: u32, sample: u32) -> usize {
    (y as usize * width as usize + x as usize) * samples as usize + sample as usize
}

impl BufferAllocator for SoftDevice {
    fn acquire(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, AllocError> {
        if self.rejected.contains(&descriptor.format) {
            return Err(AllocError::UnsupportedFormat {
                format: descriptor.format,
                reason: "disabled on this soft device".to_string(),
            });
        }
        if !SUPPORTED_SAMPLE_COUNTS.contains(&descriptor.sample_count) {
            return Err(AllocError::UnsupportedSampleCount {
                format: descriptor.format,
                samples: descriptor.sample_count,
            });
        }
        self.next_handle += 1;
        let handle = BufferHandle::from_raw(self.next_handle);
        self.buffers.insert(
            handle,
            (descriptor.semantic, SoftImage::from_descriptor(descriptor)),
        );
        self.stats.acquired += 1;
        Ok(handle)
    }

    fn release(&mut self, handle: BufferHandle) {
        if let Some((semantic, image)) = self.buffers.remove(&handle) {
            self.stats.released += 1;
            if self.capture {
                self.captured.insert(semantic, image);
            }
        }
    }
}

impl CommandSink for SoftDevice {
    type Renderable = SoftRenderable;

    fn set_global(&mut self, property: PropertyId, value: UniformValue) {
        self.globals.insert(property, value);
    }

    fn draw_renderers(
        &mut self,
        target: &TargetSetup,
        renderables: RenderableSet<'_, SoftRenderable>,
        settings: &DrawingSettings,
    ) {
        self.stats.draws += 1;
        let depth_test = target.depth == Some(RenderTarget::CameraDepth);
        let camera_samples = self.color.samples();
        let camera_width = self.color.width();
        let depth = &self.depth;
        let image = match target.color {
            RenderTarget::Buffer(handle) => self.buffers.get_mut(&handle).map(|(_, image)| image),
            RenderTarget::CameraColor => Some(&mut self.color),
            RenderTarget::CameraDepth => None,
        };
        let Some(image) = image else {
            tracing::warn!(color = %target.color, "draw into unknown target ignored");
            return;
        };

        match target.clear {
            ClearFlag::None => {}
            ClearFlag::Color => image.clear_color(target.clear_color.to_array()),
            ClearFlag::ColorStencil => {
                image.clear_color(target.clear_color.to_array());
                image.clear_stencil(0);
            }
        }

        let (width, height, samples) = (image.width(), image.height(), image.samples());
        for object in renderables.sorted(settings.sorting) {
            let rect = PixelRect::from_normalized(object.rect, width, height);
            match settings.pass {
                ShaderPass::InteriorStencil => {
                    rect.for_each_sample(width, height, samples, |x, y, sample| {
                        image.set_stencil(x, y, sample, INTERIOR_STENCIL_REF);
                    });
                }
                ShaderPass::SilhouetteFill => {
                    rect.for_each_sample(width, height, samples, |x, y, sample| {
                        if depth_test {
                            let camera_sample = sample.min(camera_samples - 1);
                            let scene_depth =
                                depth[sample_index(camera_width, camera_samples, x, y, camera_sample)];
                            if object.depth > scene_depth + DEPTH_EPSILON {
                                return;
                            }
                        }
                        image.write_sample(x, y, sample, [1.0, 0.0, 0.0, 1.0]);
                    });
                }
                pass => {
                    tracing::warn!(%pass, "full-screen pass used for a geometry draw; ignored");
                    return;
                }
            }
        }
    }

    fn blit(&mut self, source: RenderTarget, destination: RenderTarget, pass: ShaderPass) {
        self.stats.blits += 1;
        let Some(dest) = self.image(destination) else {
            tracing::warn!(%destination, "blit into unknown target ignored");
            return;
        };
        let (width, height) = (dest.width(), dest.height());
        let mode = match pass {
            ShaderPass::JfaOutline if dest.has_stencil() => WriteMode::StencilNotEqual(INTERIOR_STENCIL_REF),
            ShaderPass::BlitToTarget => WriteMode::Blend,
            _ => WriteMode::Replace,
        };
        let Some(src) = self.image(source) else {
            tracing::warn!(%source, "blit from unknown source ignored");
            return;
        };
        let size = [width as f32, height as f32];
        let mut shaded = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                shaded.push(self.shade(src, pass, x, y, size));
            }
        }

        let Some(dest) = self.image_mut(destination) else {
            return;
        };
        let samples = dest.samples();
        for y in 0..height {
            for x in 0..width {
                let value = shaded[(y * width + x) as usize];
                match mode {
                    WriteMode::Replace => dest.write_pixel(x, y, value),
                    WriteMode::StencilNotEqual(reference) => {
                        for sample in 0..samples {
                            if dest.stencil(x, y, sample) != reference {
                                dest.write_sample(x, y, sample, value);
                            }
                        }
                    }
                    WriteMode::Blend => {
                        for sample in 0..samples {
                            let blended = kernels::blend_over(value, dest.sample(x, y, sample));
                            dest.write_sample(x, y, sample, blended);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{FrameOutcome, OutlinePipeline};
    use crate::types::{CameraFrame, CameraId, LayerMask, OutlineConfig, ShaderProgramRef};

    const RED: LinearColor = LinearColor::new(1.0, 0.0, 0.0, 1.0);
    const BACKGROUND: LinearColor = LinearColor::new(0.0, 0.0, 0.2, 1.0);

    fn pipeline(width: f32, separable: bool) -> OutlinePipeline {
        let config = OutlineConfig {
            outline_color: RED,
            pixel_width: width,
            layer_mask: LayerMask::from_layers([2]),
            use_separable_axis_method: separable,
            ..OutlineConfig::default()
        };
        OutlinePipeline::with_config(&config, Some(ShaderProgramRef::new("builtin")))
    }

    fn run(
        pipeline: &OutlinePipeline,
        target: CameraTarget,
        scene: &[SoftRenderable],
    ) -> (SoftDevice, FrameOutcome) {
        let mut device = SoftDevice::new(target).capture_released();
        device.clear_camera(BACKGROUND);
        device.draw_scene(scene);
        let camera = CameraFrame::new(CameraId(0), target);
        let outcome = pipeline.render_camera(&mut device, &camera, scene);
        (device, outcome)
    }

    fn target(size: u32, samples: u32) -> CameraTarget {
        CameraTarget::new(size, size, BufferFormat::Rgba8Unorm, samples)
    }

    fn pixel(device: &SoftDevice, x: u32, y: u32) -> [f32; 4] {
        device.camera_color().load(x as i32, y as i32)
    }

    #[test]
    fn separable_and_traditional_agree_on_single_pixel_seed() {
        let seed = [SoftRenderable::new(0, 2, [8.0 / 16.0, 5.0 / 16.0, 1.0 / 16.0, 1.0 / 16.0])];
        let (traditional, _) = run(&pipeline(4.0, false), target(16, 1), &seed);
        let (separable, _) = run(&pipeline(4.0, true), target(16, 1), &seed);
        let a = traditional
            .captured(BufferSemantic::NearestPoint)
            .expect("traditional field captured");
        let b = separable
            .captured(BufferSemantic::NearestPoint)
            .expect("separable field captured");

        let size = [16.0, 16.0];
        let mut seeded = 0;
        for y in 0..16 {
            for x in 0..16 {
                let ta = a.load(x, y);
                let tb = b.load(x, y);
                let (ea, eb) = ([ta[0], ta[1]], [tb[0], tb[1]]);
                assert_eq!(is_null(ea), is_null(eb), "pixel ({x}, {y})");
                if is_null(ea) {
                    continue;
                }
                seeded += 1;
                let (pa, pb) = (decode(ea, size), decode(eb, size));
                let dist = ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt();
                assert!(dist <= 1.0, "pixel ({x}, {y}) differs by {dist}");
            }
        }
        assert!(seeded > 1);
    }

    #[test]
    fn outline_surrounds_object_and_spares_interior() {
        let albedo = LinearColor::new(0.0, 1.0, 0.0, 1.0);
        let scene = [SoftRenderable::new(0, 2, [6.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 4.0 / 16.0])
            .with_albedo(albedo)];
        let (device, outcome) = run(&pipeline(2.0, true), target(16, 1), &scene);
        assert!(outcome.is_rendered());
        assert_eq!(pixel(&device, 7, 7), albedo.to_array());
        assert_eq!(pixel(&device, 5, 7), RED.to_array());
        assert_eq!(pixel(&device, 4, 7), RED.to_array());
        assert_eq!(pixel(&device, 1, 7), BACKGROUND.to_array());
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn zero_width_leaves_camera_unchanged() {
        let scene = [SoftRenderable::new(0, 2, [0.25, 0.25, 0.5, 0.5])];
        let mut reference = SoftDevice::new(target(16, 4));
        reference.clear_camera(BACKGROUND);
        reference.draw_scene(&scene);

        let (device, outcome) = run(&pipeline(0.0, false), target(16, 4), &scene);
        assert!(outcome.is_rendered());
        assert_eq!(device.camera_color().resolve(), reference.camera_color().resolve());
        assert_eq!(device.stats().blits, 4);
    }

    #[test]
    fn rejected_format_drops_outline_and_frees_buffers() {
        let scene = [SoftRenderable::new(0, 2, [0.25, 0.25, 0.5, 0.5])];
        let mut device = SoftDevice::new(target(8, 1)).reject_format(BufferFormat::Rg16Snorm);
        device.clear_camera(BACKGROUND);
        let camera = CameraFrame::new(CameraId(3), target(8, 1));
        let outcome = pipeline(4.0, true).render_camera(&mut device, &camera, &scene);
        assert!(matches!(outcome, FrameOutcome::Dropped(_)));
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.stats().acquired, device.stats().released);
        assert_eq!(device.stats().draws, 0);
    }

    #[test]
    fn occluded_objects_leave_no_silhouette() {
        let hidden = SoftRenderable::new(0, 2, [0.25, 0.25, 0.25, 0.25]).with_depth(5.0);
        let wall = SoftRenderable::new(1, 0, [0.0, 0.0, 1.0, 1.0]).with_depth(1.0);
        let scene = [hidden, wall];
        let (device, _) = run(&pipeline(2.0, true), target(16, 1), &scene);
        let silhouette = device
            .captured(BufferSemantic::Silhouette)
            .expect("silhouette captured");
        assert!(silhouette.resolve().iter().all(|texel| texel[0] == 0.0));
    }

    #[test]
    fn msaa_silhouette_has_fractional_edges() {
        let scene = [SoftRenderable::new(0, 2, [0.25, 0.25, 0.53, 0.5])];
        let (device, _) = run(&pipeline(2.0, true), target(16, 4), &scene);
        let silhouette = device
            .captured(BufferSemantic::Silhouette)
            .expect("silhouette captured");
        assert_eq!(silhouette.samples(), 4);
        let edge = silhouette.load(12, 8)[0];
        assert!(edge > 0.0 && edge < 1.0, "edge coverage {edge}");
    }
}
