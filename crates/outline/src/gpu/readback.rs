use std::sync::mpsc;

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use image::RgbaImage;

use super::context::GpuContext;

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strips row padding and swizzles BGRA into RGBA.
fn unpad_rows(format: wgpu::TextureFormat, bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let swizzle = match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
        other => bail!("cannot read back {other:?} as 8-bit RGBA"),
    };
    let stride = padded_bytes_per_row(width) as usize;
    let row_len = width as usize * 4;
    if bytes.len() < stride * height as usize {
        bail!(
            "readback buffer holds {} bytes, expected {}",
            bytes.len(),
            stride * height as usize
        );
    }

    let mut out = Vec::with_capacity(row_len * height as usize);
    for row in bytes.chunks(stride).take(height as usize) {
        let row = &row[..row_len];
        if swizzle {
            for texel in row.chunks_exact(4) {
                out.extend_from_slice(&[texel[2], texel[1], texel[0], texel[3]]);
            }
        } else {
            out.extend_from_slice(row);
        }
    }
    Ok(out)
}

/// Copies a single-sampled 8-bit colour texture back to the host.
pub fn read_rgba8(context: &GpuContext, texture: &wgpu::Texture) -> Result<RgbaImage> {
    let (width, height) = (texture.width(), texture.height());
    let format = texture.format();
    let bytes_per_row = padded_bytes_per_row(width);
    let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    context
        .device
        .poll(wgpu::PollType::Wait)
        .context("failed waiting for readback")?;
    rx.recv()
        .context("readback callback dropped")?
        .context("failed to map readback buffer")?;

    let pixels = {
        let mapped = slice.get_mapped_range();
        unpad_rows(format, &mapped, width, height)?
    };
    buffer.unmap();

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("readback size mismatch for {width}x{height}"))
}
