//! Screen-space outlines drawn with the jump flood algorithm.
//!
//! Per camera and frame the pipeline runs three stages:
//!
//! ```text
//!   scene ──▶ MaskFillStage   stencil-mark outlined interiors (mask buffer)
//!         ──▶ SilhouetteStage coverage of outlined objects (R8, camera MSAA)
//!         ──▶ JumpFloodStage  init ─▶ flood × N ─▶ decode ─▶ composite
//! ```
//!
//! Stages never touch a device. They acquire buffers through a
//! [`BufferAllocator`] and emit ordered commands into a [`CommandSink`]; the
//! crate ships three backends for that pair:
//!
//! * [`CommandRecorder`] records the stream, for planning and tests;
//! * [`soft::SoftDevice`] executes it on the CPU;
//! * [`gpu::GpuFrame`] encodes it with `wgpu`.
//!
//! [`OutlinePipeline`] owns the stage sequence and guarantees that every
//! buffer acquired for a camera is released before the frame ends, whether
//! the outline rendered, was skipped or was dropped.

pub mod buffers;
pub mod command;
pub mod error;
pub mod filter;
pub mod gpu;
pub mod orchestrator;
pub mod pass;
pub mod registry;
pub mod schedule;
pub mod soft;
pub mod stages;
pub mod types;

pub use buffers::{
    AllocError, BufferAllocator, BufferDescriptor, BufferFormat, BufferHandle, BufferSemantic,
    FrameResources,
};
pub use command::{Command, CommandRecorder, CommandSink, RenderTarget, UniformValue};
pub use error::OutlineError;
pub use filter::{GeometryFilter, Renderable, RenderableId, ShaderTag, ShaderTagSet};
pub use orchestrator::{FrameOutcome, OutlinePipeline, ScheduledStage, SkipReason};
pub use pass::ShaderPass;
pub use registry::{properties, PropertyId};
pub use schedule::{FloodMethod, StepSchedule};
pub use stages::{JumpFloodStage, MaskFillStage, SilhouetteStage, Stage, StageKind};
pub use types::{
    CameraFrame, CameraId, CameraTarget, LayerMask, LinearColor, OutlineConfig,
    RenderPassEvent, ShaderProgramRef,
};
