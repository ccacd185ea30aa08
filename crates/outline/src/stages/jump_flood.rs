use crate::buffers::{BufferAllocator, BufferDescriptor, BufferFormat, BufferSemantic, FrameResources};
use crate::command::{CommandSink, RenderTarget, UniformValue};
use crate::error::OutlineError;
use crate::pass::ShaderPass;
use crate::registry::properties;
use crate::schedule::{FloodMethod, PingPong, StepParam, StepSchedule};
use crate::types::{CameraFrame, LinearColor};

use super::{require, StageKind};

/// Seeds, floods and decodes the nearest-point field, then composites.
#[derive(Debug, Clone, PartialEq)]
pub struct JumpFloodStage {
    color: LinearColor,
    schedule: StepSchedule,
    method: FloodMethod,
}

impl JumpFloodStage {
    pub const FORMAT: BufferFormat = BufferFormat::Rg16Snorm;

    pub fn new(color: LinearColor, pixel_width: f32, method: FloodMethod) -> Self {
        Self {
            color,
            schedule: StepSchedule::new(pixel_width),
            method,
        }
    }

    pub fn schedule(&self) -> &StepSchedule {
        &self.schedule
    }

    pub fn method(&self) -> FloodMethod {
        self.method
    }

    /// Colour handed to the decode pass, alpha faded for sub-pixel widths.
    pub fn adjusted_color(&self) -> LinearColor {
        self.color.scale_alpha(self.schedule.alpha_multiplier())
    }

    pub fn descriptors(camera: &CameraFrame) -> [BufferDescriptor; 2] {
        let (width, height) = (camera.target.width, camera.target.height);
        [
            BufferDescriptor::new(BufferSemantic::NearestPoint, Self::FORMAT, width, height),
            BufferDescriptor::new(
                BufferSemantic::NearestPointPingPong,
                Self::FORMAT,
                width,
                height,
            ),
        ]
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
        for descriptor in Self::descriptors(camera) {
            resources
                .acquire(allocator, &descriptor)
                .map_err(OutlineError::allocation(descriptor.semantic))?;
        }
        Ok(())
    }

    pub(super) fn execute<S>(
        &self,
        sink: &mut S,
        camera: &CameraFrame,
        resources: &FrameResources,
    ) -> Result<(), OutlineError>
    where
        S: CommandSink + ?Sized,
    {
        let _span = tracing::debug_span!("jump_flood", camera = %camera.id).entered();
        let stage = StageKind::JumpFlood;
        let silhouette = require(resources, stage, BufferSemantic::Silhouette)?;
        let mask = require(resources, stage, BufferSemantic::Mask)?;
        let slots = PingPong::new(
            require(resources, stage, BufferSemantic::NearestPoint)?,
            require(resources, stage, BufferSemantic::NearestPointPingPong)?,
        );

        if self.schedule.is_transparent() {
            tracing::warn!(
                camera = %camera.id,
                pixel_width = self.schedule.pixel_width(),
                "outline width rounds to zero; drawing a transparent outline"
            );
        }

        let props = properties();
        sink.set_global(props.outline_color, UniformValue::Color(self.adjusted_color()));
        sink.set_global(
            props.outline_width,
            UniformValue::Float(self.schedule.effective_width()),
        );

        let plan = self.schedule.plan(self.method);
        tracing::debug!(
            camera = %camera.id,
            method = ?plan.method,
            iterations = self.schedule.iterations(),
            init = ?plan.init_target,
            "flood plan"
        );

        sink.blit(
            RenderTarget::Buffer(silhouette),
            RenderTarget::Buffer(slots[plan.init_target]),
            ShaderPass::JfaInit,
        );
        for flood in &plan.passes {
            match flood.step {
                StepParam::Uniform(width) => {
                    sink.set_global(props.step_width, UniformValue::Float(width))
                }
                StepParam::Axis([x, y]) => {
                    sink.set_global(props.axis_width, UniformValue::Vector([x, y, 0.0, 0.0]))
                }
            }
            sink.blit(
                RenderTarget::Buffer(slots[flood.read]),
                RenderTarget::Buffer(slots[flood.write]),
                flood.pass,
            );
        }

        sink.blit(
            RenderTarget::Buffer(slots[plan.terminal]),
            RenderTarget::Buffer(mask),
            ShaderPass::JfaOutline,
        );
        sink.blit(
            RenderTarget::Buffer(mask),
            RenderTarget::CameraColor,
            ShaderPass::BlitToTarget,
        );
        Ok(())
    }
}
