//! Road outline extraction.
//!
//! The simulation paints drivable road in a narrow blue band. A frame's road
//! outline is the outer border of the largest 8-connected patch of road
//! pixels, traced as a chain code and reduced to its corner points.

use augv_core::{RoadConfig, RoadOutline};
use image::RgbImage;
use std::collections::VecDeque;

/// Chain-code steps, anticlockwise from east, in image coordinates (y down)
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Binary pixel mask in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.bits[y as usize * self.width as usize + x as usize] = value;
        }
    }
}

/// Pixels whose every channel lies within `[lower, upper]`
pub fn color_mask(image: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> Mask {
    let mut mask = Mask::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let inside = pixel
            .0
            .iter()
            .zip(lower.iter().zip(upper.iter()))
            .all(|(c, (lo, hi))| c >= lo && c <= hi);
        if inside {
            mask.set(x, y, true);
        }
    }
    mask
}

/// Largest 8-connected component of `mask`; ties go to the first found in raster order
pub fn largest_component(mask: &Mask) -> Option<Mask> {
    let (w, h) = (mask.width as i32, mask.height as i32);
    let mut visited = vec![false; mask.bits.len()];
    let mut best: Option<Vec<(i32, i32)>> = None;

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if !mask.bits[idx] || visited[idx] {
                continue;
            }

            let mut pixels = Vec::new();
            let mut queue = VecDeque::new();
            visited[idx] = true;
            queue.push_back((x, y));
            while let Some((px, py)) = queue.pop_front() {
                pixels.push((px, py));
                for (dx, dy) in DIRECTIONS {
                    let (nx, ny) = (px + dx, py + dy);
                    if !mask.get(nx, ny) {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if !visited[nidx] {
                        visited[nidx] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            if best.as_ref().map_or(true, |b| pixels.len() > b.len()) {
                best = Some(pixels);
            }
        }
    }

    best.map(|pixels| {
        let mut component = Mask::new(mask.width, mask.height);
        for (x, y) in pixels {
            component.set(x as u32, y as u32, true);
        }
        component
    })
}

/// Outer border of a single connected region, starting at its top-left pixel
pub fn trace_border(region: &Mask) -> Vec<(i32, i32)> {
    let start = (0..region.height as i32)
        .flat_map(|y| (0..region.width as i32).map(move |x| (x, y)))
        .find(|&(x, y)| region.get(x, y));
    let Some(start) = start else {
        return Vec::new();
    };

    let limit = 4 * region.bits.len() + 8;
    let mut border = vec![start];
    let mut current = start;
    let mut dir = 7usize;

    while border.len() <= limit {
        let first = if dir % 2 == 0 { (dir + 7) % 8 } else { (dir + 6) % 8 };
        let next = (0..8)
            .map(|i| (first + i) % 8)
            .find(|&d| region.get(current.0 + DIRECTIONS[d].0, current.1 + DIRECTIONS[d].1));

        let Some(d) = next else {
            // isolated pixel
            break;
        };
        dir = d;
        current = (current.0 + DIRECTIONS[d].0, current.1 + DIRECTIONS[d].1);
        border.push(current);

        let n = border.len();
        if n >= 4 && border[n - 1] == border[1] && border[n - 2] == border[0] {
            border.truncate(n - 2);
            break;
        }
    }

    border
}

/// Drop points lying in the middle of a straight run of the closed chain
pub fn compress_runs(points: &[(i32, i32)]) -> RoadOutline {
    let n = points.len();
    if n <= 2 {
        return points.iter().map(|&(x, y)| [x, y]).collect();
    }
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next = points[(i + 1) % n];
            (cur.0 - prev.0, cur.1 - prev.1) != (next.0 - cur.0, next.1 - cur.1)
        })
        .map(|i| [points[i].0, points[i].1])
        .collect()
}

/// Road outline for one frame; empty when no road pixel is visible
pub fn extract_outline(image: &RgbImage, config: &RoadConfig) -> RoadOutline {
    let mask = color_mask(image, config.lower_rgb, config.upper_rgb);
    match largest_component(&mask) {
        Some(region) => compress_runs(&trace_border(&region)),
        None => Vec::new(),
    }
}
