//! The three outline stages.
//!
//! Every stage follows the same per-camera lifecycle: `setup` acquires the
//! buffers it owns, `execute` emits its commands and `cleanup` releases what
//! it acquired. The orchestrator runs all setups, then all executes, then all
//! cleanups, always in [`Stage`] order.

mod jump_flood;
mod mask_fill;
mod silhouette;

use std::fmt;

use serde::Serialize;

pub use jump_flood::JumpFloodStage;
pub use mask_fill::MaskFillStage;
pub use silhouette::SilhouetteStage;

use crate::buffers::{BufferAllocator, BufferHandle, BufferSemantic, FrameResources};
use crate::command::CommandSink;
use crate::error::OutlineError;
use crate::filter::RenderableSet;
use crate::types::CameraFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    MaskFill,
    Silhouette,
    JumpFlood,
}

impl StageKind {
    /// Profiling scope name, also used as the tracing span name.
    pub fn sample_name(self) -> &'static str {
        match self {
            Self::MaskFill => "mask_fill",
            Self::Silhouette => "silhouette",
            Self::JumpFlood => "jump_flood",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sample_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    MaskFill(MaskFillStage),
    Silhouette(SilhouetteStage),
    JumpFlood(JumpFloodStage),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::MaskFill(_) => StageKind::MaskFill,
            Self::Silhouette(_) => StageKind::Silhouette,
            Self::JumpFlood(_) => StageKind::JumpFlood,
        }
    }

    pub fn setup<A>(
        &self,
        allocator: &mut A,
        camera: &CameraFrame,
        resources: &mut FrameResources,
    ) -> Result<(), OutlineError>
    where
        A: BufferAllocator + ?Sized,
    {
        match self {
            Self::MaskFill(stage) => stage.setup(allocator, camera, resources),
            Self::Silhouette(stage) => stage.setup(allocator, camera, resources),
            Self::JumpFlood(stage) => stage.setup(allocator, camera, resources),
        }
    }

    pub fn execute<S>(
        &self,
        sink: &mut S,
        camera: &CameraFrame,
        resources: &FrameResources,
        renderables: RenderableSet<'_, S::Renderable>,
    ) -> Result<(), OutlineError>
    where
        S: CommandSink + ?Sized,
    {
        let kind = self.kind();
        sink.begin_sample(kind.sample_name());
        let result = match self {
            Self::MaskFill(stage) => stage.execute(sink, camera, resources, renderables),
            Self::Silhouette(stage) => stage.execute(sink, camera, resources, renderables),
            Self::JumpFlood(stage) => stage.execute(sink, camera, resources),
        };
        sink.end_sample(kind.sample_name());
        result
    }

    pub fn cleanup<A>(&self, allocator: &mut A, resources: &mut FrameResources)
    where
        A: BufferAllocator + ?Sized,
    {
        for semantic in self.owned() {
            resources.release(allocator, *semantic);
        }
    }

    /// Buffers this stage acquires and releases.
    pub fn owned(&self) -> &'static [BufferSemantic] {
        match self {
            Self::MaskFill(_) => &[BufferSemantic::Mask],
            Self::Silhouette(_) => &[BufferSemantic::Silhouette],
            Self::JumpFlood(_) => &[
                BufferSemantic::NearestPoint,
                BufferSemantic::NearestPointPingPong,
            ],
        }
    }
}

fn require(
    resources: &FrameResources,
    stage: StageKind,
    semantic: BufferSemantic,
) -> Result<BufferHandle, OutlineError> {
    resources
        .get(semantic)
        .ok_or(OutlineError::MissingInput { stage, semantic })
}
