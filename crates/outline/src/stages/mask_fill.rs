use crate::buffers::{BufferAllocator, BufferDescriptor, BufferFormat, BufferSemantic, FrameResources};
use crate::command::{ClearFlag, CommandSink, RenderTarget, TargetSetup};
use crate::error::OutlineError;
use crate::filter::{DrawingSettings, RenderableSet};
use crate::pass::ShaderPass;
use crate::types::{CameraFrame, LinearColor};

use super::{require, StageKind};

/// Stamps the selected geometry into the stencil of an RGBA mask buffer.
///
/// The colour channels stay cleared; the jump-flood decode later writes the
/// outline into this same buffer wherever the stencil is unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskFillStage;

impl MaskFillStage {
    pub const FORMAT: BufferFormat = BufferFormat::Rgba8Unorm;

    pub fn new() -> Self {
        Self
    }

    pub fn descriptor(camera: &CameraFrame) -> BufferDescriptor {
        BufferDescriptor::new(
            BufferSemantic::Mask,
            Self::FORMAT,
            camera.target.width,
            camera.target.height,
        )
        .with_stencil()
    }

    pub(super) fn setup<A>(
        &self,
        allocator: &mut A,
        camera: &CameraFrame,
        resources: &mut FrameResources,
    ) -> Result<(), OutlineError>
    where
        A: BufferAllocator + ?Sized,
    {
        resources
            .acquire(allocator, &Self::descriptor(camera))
            .map_err(OutlineError::allocation(BufferSemantic::Mask))?;
        Ok(())
    }

    pub(super) fn execute<S>(
        &self,
        sink: &mut S,
        camera: &CameraFrame,
        resources: &FrameResources,
        renderables: RenderableSet<'_, S::Renderable>,
    ) -> Result<(), OutlineError>
    where
        S: CommandSink + ?Sized,
    {
        let _span = tracing::debug_span!("mask_fill", camera = %camera.id).entered();
        let mask = require(resources, StageKind::MaskFill, BufferSemantic::Mask)?;
        let target = TargetSetup::color(RenderTarget::Buffer(mask))
            .with_clear(ClearFlag::ColorStencil, LinearColor::TRANSPARENT);
        sink.draw_renderers(
            &target,
            renderables,
            &DrawingSettings::override_pass(ShaderPass::InteriorStencil),
        );
        Ok(())
    }
}
