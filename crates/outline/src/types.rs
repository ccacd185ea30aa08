use std::fmt;

use serde::Serialize;

use crate::buffers::BufferFormat;

/// Number of addressable scene layers in a [`LayerMask`].
pub const LAYER_COUNT: u8 = 32;

/// Linear-space RGBA colour. Channels may exceed `1.0` for HDR outlines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl LinearColor {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Returns the colour with its alpha multiplied by `factor`.
    pub fn scale_alpha(self, factor: f32) -> Self {
        Self {
            a: self.a * factor,
            ..self
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: f64::from(self.r),
            g: f64::from(self.g),
            b: f64::from(self.b),
            a: f64::from(self.a),
        }
    }
}

impl Default for LinearColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<[f32; 4]> for LinearColor {
    fn from(value: [f32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

/// Bit set selecting which of the [`LAYER_COUNT`] scene layers are eligible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds a mask from layer indices, ignoring indices outside the layer range.
    pub fn from_layers<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        layers
            .into_iter()
            .fold(Self::NONE, |mask, layer| mask.with_layer(layer))
    }

    pub fn with_layer(self, layer: u8) -> Self {
        if layer >= LAYER_COUNT {
            return self;
        }
        Self(self.0 | (1 << layer))
    }

    pub fn contains(self, layer: u8) -> bool {
        layer < LAYER_COUNT && self.0 & (1 << layer) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for LayerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerMask({:#034b})", self.0)
    }
}

/// Where the outline passes run relative to the host renderer's own passes.
///
/// Ordering values follow the usual forward-renderer event numbering so hosts
/// can interleave the outline with passes of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderPassEvent {
    BeforeRenderingOpaques,
    #[default]
    AfterRenderingOpaques,
    AfterRenderingSkybox,
    BeforeRenderingTransparents,
    AfterRenderingTransparents,
    BeforeRenderingPostProcessing,
    AfterRenderingPostProcessing,
    AfterRendering,
}

impl RenderPassEvent {
    pub fn order(self) -> u32 {
        match self {
            Self::BeforeRenderingOpaques => 250,
            Self::AfterRenderingOpaques => 300,
            Self::AfterRenderingSkybox => 400,
            Self::BeforeRenderingTransparents => 450,
            Self::AfterRenderingTransparents => 500,
            Self::BeforeRenderingPostProcessing => 550,
            Self::AfterRenderingPostProcessing => 600,
            Self::AfterRendering => 1000,
        }
    }
}

/// Opaque reference to the shader program implementing the seven outline passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShaderProgramRef(String);

impl ShaderProgramRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Outline settings supplied by the host once per frame.
///
/// The core only ever reads this; a new frame may bring a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineConfig {
    pub enabled: bool,
    /// Linear, HDR-capable outline colour.
    pub outline_color: LinearColor,
    /// Outline width in pixels, nominally `0..=100`.
    pub pixel_width: f32,
    pub layer_mask: LayerMask,
    /// Use the two-pass separable flood instead of the 8-neighbour flood.
    pub use_separable_axis_method: bool,
    pub schedule: RenderPassEvent,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            outline_color: LinearColor::WHITE,
            pixel_width: 4.0,
            layer_mask: LayerMask::NONE,
            use_separable_axis_method: true,
            schedule: RenderPassEvent::AfterRenderingOpaques,
        }
    }
}

/// Identifies one camera so per-camera buffers never alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera#{}", self.0)
    }
}

/// Colour target description supplied by the host for the current camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraTarget {
    pub width: u32,
    pub height: u32,
    pub format: BufferFormat,
    /// Antialiasing sample count; `0` is treated as `1`.
    pub sample_count: u32,
}

impl CameraTarget {
    pub fn new(width: u32, height: u32, format: BufferFormat, sample_count: u32) -> Self {
        Self {
            width,
            height,
            format,
            sample_count: sample_count.max(1),
        }
    }

    pub fn msaa_samples(&self) -> u32 {
        self.sample_count.max(1)
    }
}

/// Everything the host hands the pipeline about one camera for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraFrame {
    pub id: CameraId,
    pub target: CameraTarget,
    /// Whether the host exposes a depth target the silhouette can test against.
    pub has_depth: bool,
}

impl CameraFrame {
    pub fn new(id: CameraId, target: CameraTarget) -> Self {
        Self {
            id,
            target,
            has_depth: true,
        }
    }

    pub fn without_depth(mut self) -> Self {
        self.has_depth = false;
        self
    }
}
