use crate::buffers::{BufferAllocator, BufferDescriptor, BufferFormat, BufferSemantic, FrameResources};
use crate::command::{ClearFlag, CommandSink, RenderTarget, TargetSetup};
use crate::error::OutlineError;
use crate::filter::{DrawingSettings, RenderableSet};
use crate::pass::ShaderPass;
use crate::types::{CameraFrame, LinearColor};

use super::{require, StageKind};

/// Draws single-channel coverage of the selected geometry at camera MSAA.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SilhouetteStage;

impl SilhouetteStage {
    pub const FORMAT: BufferFormat = BufferFormat::R8Unorm;

    pub fn new() -> Self {
        Self
    }

    pub fn descriptor(camera: &CameraFrame) -> BufferDescriptor {
        BufferDescriptor::new(
            BufferSemantic::Silhouette,
            Self::FORMAT,
            camera.target.width,
            camera.target.height,
        )
        .with_samples(camera.target.msaa_samples())
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
            .map_err(OutlineError::allocation(BufferSemantic::Silhouette))?;
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
        let _span = tracing::debug_span!("silhouette", camera = %camera.id).entered();
        let silhouette = require(resources, StageKind::Silhouette, BufferSemantic::Silhouette)?;
        let mut target = TargetSetup::color(RenderTarget::Buffer(silhouette))
            .with_clear(ClearFlag::Color, LinearColor::TRANSPARENT);
        if camera.has_depth {
            target = target.with_depth(RenderTarget::CameraDepth);
        } else {
            tracing::debug!(camera = %camera.id, "no camera depth; silhouette drawn without occlusion");
        }
        sink.draw_renderers(
            &target,
            renderables,
            &DrawingSettings::override_pass(ShaderPass::SilhouetteFill),
        );
        Ok(())
    }
}
