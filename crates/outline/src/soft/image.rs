use crate::buffers::{BufferDescriptor, BufferFormat};

/// Multisampled float image with an optional stencil plane.
///
/// Texels are stored per sample; reads resolve by averaging the samples of a
/// pixel, the way a multisampled target resolves when it is sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftImage {
    width: u32,
    height: u32,
    samples: u32,
    format: BufferFormat,
    texels: Vec<[f32; 4]>,
    stencil: Option<Vec<u8>>,
}

impl SoftImage {
    pub fn new(width: u32, height: u32, samples: u32, format: BufferFormat) -> Self {
        let samples = samples.max(1);
        let len = width as usize * height as usize * samples as usize;
        Self {
            width,
            height,
            samples,
            format,
            texels: vec![[0.0; 4]; len],
            stencil: None,
        }
    }

    pub fn from_descriptor(descriptor: &BufferDescriptor) -> Self {
        let mut image = Self::new(
            descriptor.width,
            descriptor.height,
            descriptor.sample_count,
            descriptor.format,
        );
        if descriptor.stencil {
            image.stencil = Some(vec![0; image.texels.len()]);
        }
        image
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn has_stencil(&self) -> bool {
        self.stencil.is_some()
    }

    fn index(&self, x: u32, y: u32, sample: u32) -> usize {
        ((y as usize * self.width as usize + x as usize) * self.samples as usize) + sample as usize
    }

    /// Clamps signed pixel coordinates to the image bounds.
    pub fn clamp_coord(&self, x: i32, y: i32) -> (u32, u32) {
        let max_x = self.width.saturating_sub(1) as i32;
        let max_y = self.height.saturating_sub(1) as i32;
        (x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32)
    }

    /// Resolved texel at a clamped coordinate.
    pub fn load(&self, x: i32, y: i32) -> [f32; 4] {
        if self.texels.is_empty() {
            return [0.0; 4];
        }
        let (x, y) = self.clamp_coord(x, y);
        let mut sum = [0.0f32; 4];
        for sample in 0..self.samples {
            let texel = self.texels[self.index(x, y, sample)];
            for (acc, value) in sum.iter_mut().zip(texel) {
                *acc += value;
            }
        }
        let scale = 1.0 / self.samples as f32;
        sum.map(|value| value * scale)
    }

    pub fn sample(&self, x: u32, y: u32, sample: u32) -> [f32; 4] {
        self.texels[self.index(x, y, sample)]
    }

    pub fn write_sample(&mut self, x: u32, y: u32, sample: u32, value: [f32; 4]) {
        let index = self.index(x, y, sample);
        self.texels[index] = quantize(self.format, value);
    }

    /// Writes `value` to every sample of the pixel.
    pub fn write_pixel(&mut self, x: u32, y: u32, value: [f32; 4]) {
        let value = quantize(self.format, value);
        for sample in 0..self.samples {
            let index = self.index(x, y, sample);
            self.texels[index] = value;
        }
    }

    pub fn stencil(&self, x: u32, y: u32, sample: u32) -> u8 {
        self.stencil
            .as_ref()
            .map(|plane| plane[self.index(x, y, sample)])
            .unwrap_or(0)
    }

    pub fn set_stencil(&mut self, x: u32, y: u32, sample: u32, value: u8) {
        let index = self.index(x, y, sample);
        if let Some(plane) = self.stencil.as_mut() {
            plane[index] = value;
        }
    }

    pub fn clear_color(&mut self, value: [f32; 4]) {
        let value = quantize(self.format, value);
        self.texels.fill(value);
    }

    pub fn clear_stencil(&mut self, value: u8) {
        if let Some(plane) = self.stencil.as_mut() {
            plane.fill(value);
        }
    }

    /// Resolved copy of the whole image, row-major.
    pub fn resolve(&self) -> Vec<[f32; 4]> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.load(x as i32, y as i32));
            }
        }
        out
    }
}

/// Rounds a value to what the storage format can represent.
pub fn quantize(format: BufferFormat, value: [f32; 4]) -> [f32; 4] {
    match format {
        BufferFormat::R8Unorm => [unorm8(value[0]), 0.0, 0.0, 1.0],
        BufferFormat::Rg16Snorm => [snorm16(value[0]), snorm16(value[1]), 0.0, 1.0],
        BufferFormat::Rgba16Float => value,
        BufferFormat::Rgba8Unorm
        | BufferFormat::Rgba8UnormSrgb
        | BufferFormat::Bgra8Unorm
        | BufferFormat::Bgra8UnormSrgb => value.map(unorm8),
    }
}

fn unorm8(value: f32) -> f32 {
    (value.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

fn snorm16(value: f32) -> f32 {
    (value.clamp(-1.0, 1.0) * 32767.0).round() / 32767.0
}

pub fn linear_to_srgb(value: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multisampled_reads_resolve_to_the_average() {
        let mut image = SoftImage::new(2, 1, 4, BufferFormat::Rgba16Float);
        image.write_sample(1, 0, 0, [1.0, 0.0, 0.0, 1.0]);
        image.write_sample(1, 0, 1, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(image.load(1, 0), [0.5, 0.0, 0.0, 0.5]);
        assert_eq!(image.load(5, -3), [0.5, 0.0, 0.0, 0.5]);
        assert_eq!(image.load(0, 0), [0.0; 4]);
    }

    #[test]
    fn formats_quantize_their_channels() {
        assert_eq!(quantize(BufferFormat::R8Unorm, [0.3, 0.7, 0.1, 0.2])[1], 0.0);
        let snorm = quantize(BufferFormat::Rg16Snorm, [-2.0, 0.25, 1.0, 1.0]);
        assert_eq!(snorm[0], -1.0);
        assert!((snorm[1] - 0.25).abs() < 1.0 / 32767.0);
        assert_eq!(quantize(BufferFormat::Rgba8Unorm, [4.0; 4]), [1.0; 4]);
    }

    #[test]
    fn stencil_plane_only_exists_when_requested() {
        let mut image = SoftImage::new(1, 1, 1, BufferFormat::Rgba8Unorm);
        image.set_stencil(0, 0, 0, 1);
        assert_eq!(image.stencil(0, 0, 0), 0);
        assert!(!image.has_stencil());
    }
}
