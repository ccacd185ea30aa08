//! Per-pixel logic of the full-screen passes.
//!
//! Nearest-point fields store positions in pixel space, normalized to
//! `[-1, 1]` so they fit a signed-normalized target. `(-1, -1)` marks a pixel
//! with no known seed. These mirror the reference WGSL program pass for pass.

use super::image::SoftImage;

pub const NULL_POS: f32 = -1.0;

const INTERIOR_COVERAGE: f32 = 0.99;
const EXTERIOR_COVERAGE: f32 = 0.01;
const MIN_GRADIENT: f32 = 0.005;

pub fn encode(pos: [f32; 2], size: [f32; 2]) -> [f32; 2] {
    [pos[0] / size[0] * 2.0 - 1.0, pos[1] / size[1] * 2.0 - 1.0]
}

pub fn decode(encoded: [f32; 2], size: [f32; 2]) -> [f32; 2] {
    [
        (encoded[0] + 1.0) * size[0] * 0.5,
        (encoded[1] + 1.0) * size[1] * 0.5,
    ]
}

pub fn is_null(encoded: [f32; 2]) -> bool {
    encoded[1] == NULL_POS
}

fn size_of(image: &SoftImage) -> [f32; 2] {
    [image.width() as f32, image.height() as f32]
}

fn centre(x: u32, y: u32) -> [f32; 2] {
    [x as f32 + 0.5, y as f32 + 0.5]
}

/// Seeds the field from silhouette coverage.
///
/// Interior pixels seed their own centre; partially covered edge pixels push
/// the seed along the coverage gradient by the uncovered fraction.
pub fn jfa_init(silhouette: &SoftImage, x: u32, y: u32, target: [f32; 2]) -> [f32; 2] {
    let (ix, iy) = (x as i32, y as i32);
    let at = |dx: i32, dy: i32| silhouette.load(ix + dx, iy + dy)[0];
    let coverage = at(0, 0);
    let here = centre(x, y);
    if coverage > INTERIOR_COVERAGE {
        return encode(here, target);
    }
    if coverage < EXTERIOR_COVERAGE {
        return [NULL_POS, NULL_POS];
    }

    let left = at(-1, -1) + at(-1, 0) * 2.0 + at(-1, 1);
    let right = at(1, -1) + at(1, 0) * 2.0 + at(1, 1);
    let up = at(-1, -1) + at(0, -1) * 2.0 + at(1, -1);
    let down = at(-1, 1) + at(0, 1) * 2.0 + at(1, 1);
    let dir = [right - left, down - up];
    if dir[0].abs() <= MIN_GRADIENT && dir[1].abs() <= MIN_GRADIENT {
        return encode(here, target);
    }
    let len = (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
    let shift = 1.0 - coverage;
    encode(
        [
            here[0] + dir[0] / len * shift,
            here[1] + dir[1] / len * shift,
        ],
        target,
    )
}

fn nearest_of<I>(field: &SoftImage, x: u32, y: u32, offsets: I) -> [f32; 2]
where
    I: IntoIterator<Item = (i32, i32)>,
{
    let size = size_of(field);
    let here = centre(x, y);
    let mut best = [NULL_POS, NULL_POS];
    let mut best_dist = f32::INFINITY;
    for (dx, dy) in offsets {
        let texel = field.load(x as i32 + dx, y as i32 + dy);
        let encoded = [texel[0], texel[1]];
        if is_null(encoded) {
            continue;
        }
        let pos = decode(encoded, size);
        let (ox, oy) = (here[0] - pos[0], here[1] - pos[1]);
        let dist = ox * ox + oy * oy;
        if dist < best_dist {
            best_dist = dist;
            best = encoded;
        }
    }
    best
}

/// 8-neighbour flood step; offsets truncate `step` toward zero.
pub fn jfa_flood(field: &SoftImage, x: u32, y: u32, step: f32) -> [f32; 2] {
    let offsets = (-1..=1).flat_map(move |v: i32| {
        (-1..=1).map(move |u: i32| ((u as f32 * step) as i32, (v as f32 * step) as i32))
    });
    nearest_of(field, x, y, offsets)
}

/// 3-tap flood step along one axis.
pub fn jfa_flood_axis(field: &SoftImage, x: u32, y: u32, axis: [f32; 2]) -> [f32; 2] {
    let offsets = (-1..=1).map(move |u: i32| {
        let u = u as f32;
        ((u * axis[0]) as i32, (u * axis[1]) as i32)
    });
    nearest_of(field, x, y, offsets)
}

/// Outline colour for one pixel, alpha weighted by distance to the nearest seed.
pub fn jfa_outline(field: &SoftImage, x: u32, y: u32, color: [f32; 4], width: f32) -> [f32; 4] {
    let texel = field.load(x as i32, y as i32);
    let encoded = [texel[0], texel[1]];
    if is_null(encoded) {
        return [0.0; 4];
    }
    let pos = decode(encoded, size_of(field));
    let here = centre(x, y);
    let dist = ((here[0] - pos[0]).powi(2) + (here[1] - pos[1]).powi(2)).sqrt();
    let outline = (width - dist + 1.0).clamp(0.0, 1.0);
    [color[0], color[1], color[2], color[3] * outline]
}

/// Source-over blend with premultiplied-style alpha accumulation.
pub fn blend_over(src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let a = src[3];
    [
        src[0] * a + dst[0] * (1.0 - a),
        src[1] * a + dst[1] * (1.0 - a),
        src[2] * a + dst[2] * (1.0 - a),
        a + dst[3] * (1.0 - a),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferFormat;

    fn silhouette_with(pixels: &[(u32, u32, f32)], w: u32, h: u32) -> SoftImage {
        let mut image = SoftImage::new(w, h, 1, BufferFormat::R8Unorm);
        for (x, y, c) in pixels {
            image.write_pixel(*x, *y, [*c, 0.0, 0.0, 1.0]);
        }
        image
    }

    #[test]
    fn encode_decode_recovers_position() {
        let size = [64.0, 32.0];
        let pos = [10.5, 3.5];
        let back = decode(encode(pos, size), size);
        assert!((back[0] - pos[0]).abs() < 1e-4);
        assert!((back[1] - pos[1]).abs() < 1e-4);
    }

    #[test]
    fn init_classifies_interior_exterior_and_edges() {
        let sil = silhouette_with(&[(1, 1, 1.0), (2, 1, 0.5)], 4, 3);
        let size = [4.0, 3.0];
        assert_eq!(jfa_init(&sil, 0, 0, size), [NULL_POS, NULL_POS]);
        let interior = decode(jfa_init(&sil, 1, 1, size), size);
        assert!((interior[0] - 1.5).abs() < 1e-4);
        // Half-covered pixel to the right of a solid one seeds half a pixel inward.
        let edge = decode(jfa_init(&sil, 2, 1, size), size);
        assert!(edge[0] < 2.5);
        assert!((edge[0] - 2.0).abs() < 0.01);
    }

    #[test]
    fn flood_finds_seed_within_step() {
        let mut field = SoftImage::new(8, 8, 1, BufferFormat::Rg16Snorm);
        field.clear_color([NULL_POS, NULL_POS, 0.0, 1.0]);
        let size = [8.0, 8.0];
        let seed = encode([4.5, 4.5], size);
        field.write_pixel(4, 4, [seed[0], seed[1], 0.0, 1.0]);
        let found = decode(jfa_flood(&field, 2, 2, 2.5), size);
        assert!((found[0] - 4.5).abs() < 1e-3 && (found[1] - 4.5).abs() < 1e-3);
        assert!(is_null(jfa_flood(&field, 0, 0, 1.5)));
        let horizontal = decode(jfa_flood_axis(&field, 2, 4, [2.5, 0.0]), size);
        assert!((horizontal[0] - 4.5).abs() < 1e-3);
        assert!(is_null(jfa_flood_axis(&field, 2, 4, [0.0, 2.5])));
    }

    #[test]
    fn outline_alpha_falls_off_with_distance() {
        let mut field = SoftImage::new(8, 1, 1, BufferFormat::Rg16Snorm);
        let size = [8.0, 1.0];
        let seed = encode([0.5, 0.5], size);
        for x in 0..8 {
            field.write_pixel(x, 0, [seed[0], seed[1], 0.0, 1.0]);
        }
        let color = [1.0, 0.0, 0.0, 1.0];
        assert_eq!(jfa_outline(&field, 2, 0, color, 2.0)[3], 1.0);
        assert_eq!(jfa_outline(&field, 4, 0, color, 2.0)[3], 0.0);
        let mut empty = SoftImage::new(1, 1, 1, BufferFormat::Rg16Snorm);
        empty.clear_color([NULL_POS, NULL_POS, 0.0, 0.0]);
        assert_eq!(jfa_outline(&empty, 0, 0, color, 4.0), [0.0; 4]);
    }

    #[test]
    fn blend_over_respects_alpha() {
        assert_eq!(blend_over([1.0, 1.0, 1.0, 0.0], [0.2, 0.2, 0.2, 1.0]), [0.2, 0.2, 0.2, 1.0]);
        assert_eq!(blend_over([1.0, 0.0, 0.0, 1.0], [0.2, 0.2, 0.2, 1.0]), [1.0, 0.0, 0.0, 1.0]);
    }
}
