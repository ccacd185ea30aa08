//! Command stream emitted by the stages.
//!
//! Stages never talk to a device directly. They push globals, geometry draws
//! and full-screen blits into a [`CommandSink`], in the order the device must
//! execute them; a backend either records, simulates or encodes them.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use crate::buffers::{AllocError, BufferAllocator, BufferDescriptor, BufferFormat, BufferHandle};
use crate::filter::{DrawingSettings, Renderable, RenderableId, RenderableSet};
use crate::pass::ShaderPass;
use crate::registry::PropertyId;
use crate::types::LinearColor;

/// Where a draw or blit reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "handle")]
pub enum RenderTarget {
    Buffer(BufferHandle),
    CameraColor,
    CameraDepth,
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(handle) => write!(f, "buffer{handle}"),
            Self::CameraColor => f.write_str("camera-color"),
            Self::CameraDepth => f.write_str("camera-depth"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "value")]
pub enum UniformValue {
    Float(f32),
    Vector([f32; 4]),
    Color(LinearColor),
}

impl UniformValue {
    pub fn to_vec4(self) -> [f32; 4] {
        match self {
            Self::Float(value) => [value, 0.0, 0.0, 0.0],
            Self::Vector(value) => value,
            Self::Color(color) => color.to_array(),
        }
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(value) => write!(f, "{value}"),
            Self::Vector([x, y, z, w]) => write!(f, "({x}, {y}, {z}, {w})"),
            Self::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearFlag {
    #[default]
    None,
    Color,
    ColorStencil,
}

/// Attachments and clear behaviour for a geometry draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetSetup {
    pub color: RenderTarget,
    /// Read-only depth to test against, if any.
    pub depth: Option<RenderTarget>,
    pub clear: ClearFlag,
    pub clear_color: LinearColor,
}

impl TargetSetup {
    pub fn color(target: RenderTarget) -> Self {
        Self {
            color: target,
            depth: None,
            clear: ClearFlag::None,
            clear_color: LinearColor::TRANSPARENT,
        }
    }

    pub fn with_depth(mut self, depth: RenderTarget) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_clear(mut self, clear: ClearFlag, color: LinearColor) -> Self {
        self.clear = clear;
        self.clear_color = color;
        self
    }
}

/// Ordered command consumer supplied by the backend.
pub trait CommandSink {
    type Renderable: Renderable;

    fn set_global(&mut self, property: PropertyId, value: UniformValue);

    /// Rasterizes `renderables` into `target` using the override pass in `settings`.
    fn draw_renderers(
        &mut self,
        target: &TargetSetup,
        renderables: RenderableSet<'_, Self::Renderable>,
        settings: &DrawingSettings,
    );

    /// Full-screen pass reading `source` and writing `destination`.
    fn blit(&mut self, source: RenderTarget, destination: RenderTarget, pass: ShaderPass);

    fn begin_sample(&mut self, _name: &'static str) {}

    fn end_sample(&mut self, _name: &'static str) {}
}

/// One recorded operation, allocator calls included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Command {
    Acquire {
        handle: BufferHandle,
        descriptor: BufferDescriptor,
    },
    Release {
        handle: BufferHandle,
    },
    BeginSample {
        name: &'static str,
    },
    EndSample {
        name: &'static str,
    },
    SetGlobal {
        property: PropertyId,
        value: UniformValue,
    },
    DrawRenderers {
        target: TargetSetup,
        renderables: Vec<RenderableId>,
        settings: DrawingSettings,
    },
    Blit {
        source: RenderTarget,
        destination: RenderTarget,
        pass: ShaderPass,
    },
}

impl Command {
    pub fn is_allocation(&self) -> bool {
        matches!(self, Self::Acquire { .. } | Self::Release { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquire { handle, descriptor } => write!(
                f,
                "acquire {handle} {} {} {}x{} samples={}{}",
                descriptor.semantic,
                descriptor.format,
                descriptor.width,
                descriptor.height,
                descriptor.sample_count,
                if descriptor.stencil { " +stencil" } else { "" }
            ),
            Self::Release { handle } => write!(f, "release {handle}"),
            Self::BeginSample { name } => write!(f, "begin {name}"),
            Self::EndSample { name } => write!(f, "end {name}"),
            Self::SetGlobal { property, value } => write!(f, "  set {property} = {value}"),
            Self::DrawRenderers {
                target,
                renderables,
                settings,
            } => {
                write!(
                    f,
                    "  draw {} -> {}",
                    settings.pass,
                    target.color
                )?;
                if let Some(depth) = target.depth {
                    write!(f, " (depth {depth})")?;
                }
                write!(f, " clear={:?} objects={}", target.clear, renderables.len())
            }
            Self::Blit {
                source,
                destination,
                pass,
            } => write!(f, "  blit {pass} {source} -> {destination}"),
        }
    }
}

/// Backend that records every call instead of executing it.
///
/// Used by the planner and by tests; it also acts as an allocator so a whole
/// frame can be captured in one ordered list.
pub struct CommandRecorder<R> {
    commands: Vec<Command>,
    next_handle: u64,
    live: BTreeSet<BufferHandle>,
    rejected: Vec<BufferFormat>,
    _renderable: PhantomData<fn() -> R>,
}

impl<R> Default for CommandRecorder<R> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            next_handle: 0,
            live: BTreeSet::new(),
            rejected: Vec::new(),
            _renderable: PhantomData,
        }
    }
}

impl<R> fmt::Debug for CommandRecorder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRecorder")
            .field("commands", &self.commands.len())
            .field("live", &self.live)
            .field("rejected", &self.rejected)
            .finish()
    }
}

impl<R> CommandRecorder<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later acquisition of `format` fail as unsupported.
    pub fn reject_format(mut self, format: BufferFormat) -> Self {
        self.rejected.push(format);
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn acquisitions(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Acquire { .. }))
            .count()
    }

    pub fn releases(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Release { .. }))
            .count()
    }

    /// Commands other than allocator traffic.
    pub fn render_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|c| !c.is_allocation())
    }

    pub fn blits(&self) -> impl Iterator<Item = (RenderTarget, RenderTarget, ShaderPass)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::Blit {
                source,
                destination,
                pass,
            } => Some((*source, *destination, *pass)),
            _ => None,
        })
    }

    pub fn live_handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.live.iter().copied()
    }

    pub fn is_idle(&self) -> bool {
        self.live.is_empty()
    }
}

impl<R> BufferAllocator for CommandRecorder<R> {
    fn acquire(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, AllocError> {
        if self.rejected.contains(&descriptor.format) {
            return Err(AllocError::UnsupportedFormat {
                format: descriptor.format,
                reason: "rejected by recorder".to_string(),
            });
        }
        self.next_handle += 1;
        let handle = BufferHandle::from_raw(self.next_handle);
        self.live.insert(handle);
        self.commands.push(Command::Acquire {
            handle,
            descriptor: *descriptor,
        });
        Ok(handle)
    }

    fn release(&mut self, handle: BufferHandle) {
        if self.live.remove(&handle) {
            self.commands.push(Command::Release { handle });
        }
    }
}

impl<R: Renderable> CommandSink for CommandRecorder<R> {
    type Renderable = R;

    fn set_global(&mut self, property: PropertyId, value: UniformValue) {
        self.commands.push(Command::SetGlobal { property, value });
    }

    fn draw_renderers(
        &mut self,
        target: &TargetSetup,
        renderables: RenderableSet<'_, R>,
        settings: &DrawingSettings,
    ) {
        let renderables = renderables
            .sorted(settings.sorting)
            .into_iter()
            .map(Renderable::id)
            .collect();
        self.commands.push(Command::DrawRenderers {
            target: *target,
            renderables,
            settings: *settings,
        });
    }

    fn blit(&mut self, source: RenderTarget, destination: RenderTarget, pass: ShaderPass) {
        self.commands.push(Command::Blit {
            source,
            destination,
            pass,
        });
    }

    fn begin_sample(&mut self, name: &'static str) {
        self.commands.push(Command::BeginSample { name });
    }

    fn end_sample(&mut self, name: &'static str) {
        self.commands.push(Command::EndSample { name });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferSemantic;
    use crate::filter::ShaderTag;

    struct Dummy;

    impl Renderable for Dummy {
        fn id(&self) -> RenderableId {
            RenderableId(0)
        }
        fn layer(&self) -> u8 {
            0
        }
        fn shader_tags(&self) -> &[ShaderTag] {
            &[]
        }
    }

    #[test]
    fn recorder_only_records_live_releases() {
        let mut recorder = CommandRecorder::<Dummy>::new();
        let descriptor =
            BufferDescriptor::new(BufferSemantic::Silhouette, BufferFormat::R8Unorm, 4, 4);
        let handle = recorder.acquire(&descriptor).unwrap();
        recorder.release(handle);
        recorder.release(handle);
        recorder.release(BufferHandle::from_raw(99));
        assert_eq!(recorder.acquisitions(), 1);
        assert_eq!(recorder.releases(), 1);
        assert!(recorder.is_idle());
    }

    #[test]
    fn rejected_formats_fail_acquisition() {
        let mut recorder = CommandRecorder::<Dummy>::new().reject_format(BufferFormat::Rg16Snorm);
        let descriptor =
            BufferDescriptor::new(BufferSemantic::NearestPoint, BufferFormat::Rg16Snorm, 4, 4);
        assert!(recorder.acquire(&descriptor).is_err());
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn commands_render_as_text() {
        let blit = Command::Blit {
            source: RenderTarget::Buffer(BufferHandle::from_raw(3)),
            destination: RenderTarget::CameraColor,
            pass: ShaderPass::BlitToTarget,
        };
        assert_eq!(
            blit.to_string(),
            "  blit blit-to-target(6) buffer#3 -> camera-color"
        );
    }

    #[test]
    fn uniform_values_widen_to_vec4() {
        assert_eq!(UniformValue::Float(2.5).to_vec4(), [2.5, 0.0, 0.0, 0.0]);
        assert_eq!(
            UniformValue::Color(LinearColor::new(1.0, 0.5, 0.0, 0.25)).to_vec4(),
            [1.0, 0.5, 0.0, 0.25]
        );
    }
}
