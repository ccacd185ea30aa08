//! Sample-accurate rasterization of axis-aligned screen rectangles.

/// Standard multisample positions in 1/16 pixel units, relative to the pixel centre.
const PATTERN_2: [(i8, i8); 2] = [(4, 4), (-4, -4)];
const PATTERN_4: [(i8, i8); 4] = [(-2, -6), (6, -2), (-6, 2), (2, 6)];
const PATTERN_8: [(i8, i8); 8] = [
    (1, -3),
    (-1, 3),
    (5, 1),
    (-3, -5),
    (-5, 5),
    (-7, -1),
    (3, 7),
    (7, -7),
];
const PATTERN_16: [(i8, i8); 16] = [
    (1, 1),
    (-1, -3),
    (-3, 2),
    (4, -1),
    (-5, -2),
    (2, 5),
    (5, 3),
    (3, -5),
    (-2, 6),
    (0, -7),
    (-4, -6),
    (-6, 4),
    (-8, 0),
    (7, -4),
    (6, 7),
    (-7, -8),
];

/// Sample counts the reference rasterizer knows a pattern for.
pub const SUPPORTED_SAMPLE_COUNTS: [u32; 5] = [1, 2, 4, 8, 16];

/// Offsets from the pixel origin (top-left corner) of each sample.
pub fn sample_offsets(samples: u32) -> Vec<(f32, f32)> {
    let pattern: &[(i8, i8)] = match samples {
        2 => &PATTERN_2,
        4 => &PATTERN_4,
        8 => &PATTERN_8,
        16 => &PATTERN_16,
        _ => &[(0, 0)],
    };
    pattern
        .iter()
        .map(|(dx, dy)| (0.5 + f32::from(*dx) / 16.0, 0.5 + f32::from(*dy) / 16.0))
        .collect()
}

/// Rectangle in pixel space, half-open on the right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PixelRect {
    /// Maps a normalized `[x, y, w, h]` rectangle (origin top-left) onto a target.
    pub fn from_normalized(rect: [f32; 4], width: u32, height: u32) -> Self {
        let [x, y, w, h] = rect;
        Self {
            x0: x * width as f32,
            y0: y * height as f32,
            x1: (x + w) * width as f32,
            y1: (y + h) * height as f32,
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Inclusive pixel range that may hold covered samples, clipped to the target.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 || self.x1 <= self.x0 || self.y1 <= self.y0 {
            return None;
        }
        let min_x = self.x0.floor().max(0.0) as u32;
        let min_y = self.y0.floor().max(0.0) as u32;
        let max_x = (self.x1.ceil() as i64 - 1).clamp(0, i64::from(width) - 1) as u32;
        let max_y = (self.y1.ceil() as i64 - 1).clamp(0, i64::from(height) - 1) as u32;
        if min_x >= width || min_y >= height || self.x1 <= 0.0 || self.y1 <= 0.0 {
            return None;
        }
        Some((min_x, min_y, max_x, max_y))
    }

    /// Visits every covered `(x, y, sample)` triple.
    pub fn for_each_sample<F>(&self, width: u32, height: u32, samples: u32, mut visit: F)
    where
        F: FnMut(u32, u32, u32),
    {
        let Some((min_x, min_y, max_x, max_y)) = self.pixel_bounds(width, height) else {
            return;
        };
        let offsets = sample_offsets(samples);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                for (sample, (dx, dy)) in offsets.iter().enumerate() {
                    if self.contains(x as f32 + dx, y as f32 + dy) {
                        visit(x, y, sample as u32);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_uses_pixel_centre() {
        assert_eq!(sample_offsets(1), [(0.5, 0.5)]);
        assert_eq!(sample_offsets(3), [(0.5, 0.5)]);
        assert_eq!(sample_offsets(8).len(), 8);
    }

    #[test]
    fn rect_covers_expected_pixels() {
        let rect = PixelRect::from_normalized([0.25, 0.5, 0.5, 0.25], 8, 8);
        let mut covered = Vec::new();
        rect.for_each_sample(8, 8, 1, |x, y, _| covered.push((x, y)));
        assert_eq!(covered, [(2, 4), (3, 4), (4, 4), (5, 4), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[test]
    fn half_covered_pixel_gets_partial_msaa_coverage() {
        // Left half of pixel 0 only.
        let rect = PixelRect {
            x0: 0.0,
            y0: 0.0,
            x1: 0.5,
            y1: 1.0,
        };
        let mut hits = 0;
        rect.for_each_sample(4, 1, 4, |_, _, _| hits += 1);
        assert_eq!(hits, 2);
    }

    #[test]
    fn off_screen_rect_is_clipped_away() {
        let rect = PixelRect::from_normalized([1.5, 0.0, 0.5, 1.0], 4, 4);
        assert_eq!(rect.pixel_bounds(4, 4), None);
    }
}
