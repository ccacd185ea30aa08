//! wgpu backend.
//!
//! [`GpuAllocator`] pools render targets, [`OutlineProgram`] owns the WGSL
//! program and its pipelines, and [`GpuFrame`] encodes one camera's command
//! stream. Everything runs headless; readback copies the camera colour to an
//! [`image::RgbaImage`].

mod allocator;
mod context;
mod mesh;
mod program;
mod readback;
mod sink;
mod uniforms;

pub use allocator::{texture_format, GpuAllocator};
pub use context::{FormatSupport, GpuContext, GpuOptions, GpuPowerPreference};
pub use mesh::{CameraTargets, GpuMesh, FAR_PLANE};
pub use program::{OutlineProgram, PipelineKey, ProgramPass};
pub use readback::read_rgba8;
pub use sink::GpuFrame;
