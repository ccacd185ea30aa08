//! Per-frame temporary render targets.
//!
//! Stages describe the buffers they need with a [`BufferDescriptor`] and ask a
//! backend-provided [`BufferAllocator`] for them. [`FrameResources`] tracks
//! what one camera acquired during a frame so cleanup can hand every handle
//! back, whatever happened in between.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::registry::{properties, PropertyId};
use crate::types::CameraId;

/// Pixel formats the pipeline and its host targets use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    R8Unorm,
    Rg16Snorm,
}

impl BufferFormat {
    pub fn channels(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg16Snorm => 2,
            _ => 4,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg16Snorm => 4,
            Self::Rgba16Float => 8,
            _ => 4,
        }
    }

    pub fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }
}

impl fmt::Display for BufferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgba8Unorm => "rgba8unorm",
            Self::Rgba8UnormSrgb => "rgba8unorm-srgb",
            Self::Bgra8Unorm => "bgra8unorm",
            Self::Bgra8UnormSrgb => "bgra8unorm-srgb",
            Self::Rgba16Float => "rgba16float",
            Self::R8Unorm => "r8unorm",
            Self::Rg16Snorm => "rg16snorm",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    #[default]
    Point,
    Bilinear,
}

/// What a buffer is for; doubles as its key within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferSemantic {
    Mask,
    Silhouette,
    NearestPoint,
    NearestPointPingPong,
}

impl BufferSemantic {
    pub const ALL: [BufferSemantic; 4] = [
        Self::Mask,
        Self::Silhouette,
        Self::NearestPoint,
        Self::NearestPointPingPong,
    ];

    /// Shader property the buffer is bound to.
    pub fn property(self) -> PropertyId {
        let props = properties();
        match self {
            Self::Mask => props.mask_buffer,
            Self::Silhouette => props.silhouette_buffer,
            Self::NearestPoint => props.nearest_point,
            Self::NearestPointPingPong => props.nearest_point_ping_pong,
        }
    }
}

impl fmt::Display for BufferSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property().name())
    }
}

/// Request for one temporary render target.
///
/// Mip maps are never generated and sampling is always point filtered; both
/// fields exist so backends can assert it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferDescriptor {
    pub semantic: BufferSemantic,
    pub format: BufferFormat,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub stencil: bool,
    pub filter: FilterMode,
    pub mipmaps: bool,
}

impl BufferDescriptor {
    pub fn new(semantic: BufferSemantic, format: BufferFormat, width: u32, height: u32) -> Self {
        Self {
            semantic,
            format,
            width,
            height,
            sample_count: 1,
            stencil: false,
            filter: FilterMode::Point,
            mipmaps: false,
        }
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.sample_count = samples.max(1);
        self
    }

    pub fn with_stencil(mut self) -> Self {
        self.stencil = true;
        self
    }

    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Backend-issued handle, valid until released or until the frame ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("format {format} is not supported by the device: {reason}")]
    UnsupportedFormat {
        format: BufferFormat,
        reason: String,
    },
    #[error("{semantic} would have zero extent")]
    ZeroExtent { semantic: BufferSemantic },
    #[error("format {format} does not support {samples}x multisampling")]
    UnsupportedSampleCount { format: BufferFormat, samples: u32 },
}

/// Backend that hands out per-frame render targets.
///
/// Acquisition must fail instead of substituting a different format. Releasing
/// a handle that is unknown or already released does nothing.
pub trait BufferAllocator {
    fn acquire(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, AllocError>;
    fn release(&mut self, handle: BufferHandle);
}

/// Live buffers owned by one camera's frame, keyed by semantic.
#[derive(Debug)]
pub struct FrameResources {
    camera: CameraId,
    live: BTreeMap<BufferSemantic, BufferHandle>,
}

impl FrameResources {
    pub fn new(camera: CameraId) -> Self {
        Self {
            camera,
            live: BTreeMap::new(),
        }
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    /// Acquires a buffer and records it under its semantic.
    ///
    /// A semantic already live in this frame is released first so one frame
    /// never holds two buffers for the same role.
    pub fn acquire<A>(
        &mut self,
        allocator: &mut A,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferHandle, AllocError>
    where
        A: BufferAllocator + ?Sized,
    {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(AllocError::ZeroExtent {
                semantic: descriptor.semantic,
            });
        }
        self.release(allocator, descriptor.semantic);
        let handle = allocator.acquire(descriptor)?;
        tracing::debug!(
            camera = %self.camera,
            semantic = %descriptor.semantic,
            format = %descriptor.format,
            width = descriptor.width,
            height = descriptor.height,
            samples = descriptor.sample_count,
            handle = %handle,
            "acquired buffer"
        );
        self.live.insert(descriptor.semantic, handle);
        Ok(handle)
    }

    pub fn get(&self, semantic: BufferSemantic) -> Option<BufferHandle> {
        self.live.get(&semantic).copied()
    }

    pub fn contains(&self, semantic: BufferSemantic) -> bool {
        self.live.contains_key(&semantic)
    }

    /// Releases the buffer for `semantic`; returns whether one was live.
    pub fn release<A>(&mut self, allocator: &mut A, semantic: BufferSemantic) -> bool
    where
        A: BufferAllocator + ?Sized,
    {
        match self.live.remove(&semantic) {
            Some(handle) => {
                allocator.release(handle);
                tracing::debug!(camera = %self.camera, %semantic, handle = %handle, "released buffer");
                true
            }
            None => false,
        }
    }

    /// Releases everything still live and returns how many buffers that was.
    pub fn release_all<A>(&mut self, allocator: &mut A) -> usize
    where
        A: BufferAllocator + ?Sized,
    {
        let live = std::mem::take(&mut self.live);
        for (semantic, handle) in &live {
            allocator.release(*handle);
            tracing::debug!(camera = %self.camera, %semantic, handle = %handle, "released buffer");
        }
        live.len()
    }

    pub fn live(&self) -> impl Iterator<Item = (BufferSemantic, BufferHandle)> + '_ {
        self.live.iter().map(|(semantic, handle)| (*semantic, *handle))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            let leaked: Vec<_> = self.live.keys().map(|s| s.to_string()).collect();
            tracing::warn!(camera = %self.camera, ?leaked, "frame resources dropped with live buffers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingAllocator {
        next: u64,
        live: Vec<BufferHandle>,
        released: Vec<BufferHandle>,
        reject: Option<BufferFormat>,
    }

    impl BufferAllocator for CountingAllocator {
        fn acquire(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, AllocError> {
            if self.reject == Some(descriptor.format) {
                return Err(AllocError::UnsupportedFormat {
                    format: descriptor.format,
                    reason: "rejected by test".into(),
                });
            }
            self.next += 1;
            let handle = BufferHandle::from_raw(self.next);
            self.live.push(handle);
            Ok(handle)
        }

        fn release(&mut self, handle: BufferHandle) {
            if let Some(index) = self.live.iter().position(|h| *h == handle) {
                self.live.swap_remove(index);
                self.released.push(handle);
            }
        }
    }

    fn mask(width: u32, height: u32) -> BufferDescriptor {
        BufferDescriptor::new(BufferSemantic::Mask, BufferFormat::Rgba8Unorm, width, height)
            .with_stencil()
    }

    #[test]
    fn acquire_and_release_all_balance() {
        let mut allocator = CountingAllocator::default();
        let mut frame = FrameResources::new(CameraId(0));
        frame.acquire(&mut allocator, &mask(8, 8)).unwrap();
        frame
            .acquire(
                &mut allocator,
                &BufferDescriptor::new(BufferSemantic::Silhouette, BufferFormat::R8Unorm, 8, 8),
            )
            .unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.release_all(&mut allocator), 2);
        assert!(frame.is_empty());
        assert!(allocator.live.is_empty());
    }

    #[test]
    fn releasing_unknown_semantic_is_noop() {
        let mut allocator = CountingAllocator::default();
        let mut frame = FrameResources::new(CameraId(0));
        assert!(!frame.release(&mut allocator, BufferSemantic::NearestPoint));
        assert!(allocator.released.is_empty());
    }

    #[test]
    fn reacquiring_a_semantic_releases_the_previous_buffer() {
        let mut allocator = CountingAllocator::default();
        let mut frame = FrameResources::new(CameraId(1));
        let first = frame.acquire(&mut allocator, &mask(4, 4)).unwrap();
        let second = frame.acquire(&mut allocator, &mask(4, 4)).unwrap();
        assert_ne!(first, second);
        assert_eq!(allocator.released, [first]);
        frame.release_all(&mut allocator);
    }

    #[test]
    fn zero_extent_never_reaches_the_allocator() {
        let mut allocator = CountingAllocator::default();
        let mut frame = FrameResources::new(CameraId(0));
        let err = frame.acquire(&mut allocator, &mask(0, 16)).unwrap_err();
        assert_eq!(
            err,
            AllocError::ZeroExtent {
                semantic: BufferSemantic::Mask
            }
        );
        assert_eq!(allocator.next, 0);
    }

    #[test]
    fn rejected_format_is_reported_not_substituted() {
        let mut allocator = CountingAllocator {
            reject: Some(BufferFormat::Rg16Snorm),
            ..Default::default()
        };
        let mut frame = FrameResources::new(CameraId(0));
        let descriptor =
            BufferDescriptor::new(BufferSemantic::NearestPoint, BufferFormat::Rg16Snorm, 2, 2);
        let err = frame.acquire(&mut allocator, &descriptor).unwrap_err();
        assert!(matches!(
            err,
            AllocError::UnsupportedFormat {
                format: BufferFormat::Rg16Snorm,
                ..
            }
        ));
        assert!(!frame.contains(BufferSemantic::NearestPoint));
    }

    #[test]
    fn semantics_bind_to_distinct_properties() {
        let props = properties();
        assert_eq!(BufferSemantic::Mask.property(), props.mask_buffer);
        assert_eq!(
            BufferSemantic::NearestPointPingPong.to_string(),
            "_NearestPointPingPong"
        );
    }
}
