//! Debug snapshots: detections and road outline drawn over the frame

use crate::error::VisionError;
use crate::frame::Frame;
use augv_core::{AgentId, Detection};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};

const BLOCKING: Rgb<u8> = Rgb([255, 0, 0]);
const OTHER: Rgb<u8> = Rgb([0, 255, 0]);
const FEET: Rgb<u8> = Rgb([0, 0, 255]);
const OUTLINE: Rgb<u8> = Rgb([255, 255, 0]);

/// Render detections and the road outline over a copy of the frame.
///
/// Boxes of blocking-class detections are red, all others green; every
/// detection carrying a feet point gets a small blue marker.
pub fn annotate(
    frame: &Frame,
    detections: &[Detection],
    road_outline: &[[i32; 2]],
    is_blocking: impl Fn(&str) -> bool,
) -> RgbImage {
    let mut image = frame.as_rgb().clone();

    if road_outline.len() > 1 {
        for i in 0..road_outline.len() {
            let a = road_outline[i];
            let b = road_outline[(i + 1) % road_outline.len()];
            draw_line(&mut image, a[0], a[1], b[0], b[1], OUTLINE);
        }
    }

    for detection in detections {
        let (left, top, right, bottom) = detection.bbox.corners();
        let color = if is_blocking(&detection.label) { BLOCKING } else { OTHER };
        draw_rectangle(
            &mut image,
            left.round() as i32,
            top.round() as i32,
            right.round() as i32,
            bottom.round() as i32,
            color,
        );
        if let Some([fx, fy]) = detection.feet {
            let (fx, fy) = (fx.round() as i32, fy.round() as i32);
            fill_rect(
                &mut image,
                fx.saturating_sub(2),
                fy.saturating_sub(2),
                fx.saturating_add(2),
                fy.saturating_add(2),
                FEET,
            );
        }
    }

    image
}

/// `<dir>/<sanitized agent id>.jpg`
pub fn snapshot_path(dir: &Path, agent_id: &AgentId) -> PathBuf {
    dir.join(format!("{}.jpg", agent_id.file_stem()))
}

/// Write the snapshot as JPEG, replacing the previous one for this agent
pub fn write_snapshot(
    dir: &Path,
    agent_id: &AgentId,
    image: &RgbImage,
) -> Result<PathBuf, VisionError> {
    std::fs::create_dir_all(dir)?;
    let path = snapshot_path(dir, agent_id);
    image.save_with_format(&path, ImageFormat::Jpeg)?;
    Ok(path)
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let Some((x0, y0, x1, y1)) = visible_span(image, left, top, right, bottom) else {
        return;
    };
    for x in x0..=x1 {
        put(image, x, top, color);
        put(image, x, bottom, color);
    }
    for y in y0..=y1 {
        put(image, left, y, color);
        put(image, right, y, color);
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let Some((x0, y0, x1, y1)) = visible_span(image, left, top, right, bottom) else {
        return;
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            put(image, x, y, color);
        }
    }
}

/// Part of the rectangle inside the image, `None` when they do not overlap
fn visible_span(
    image: &RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
) -> Option<(i32, i32, i32, i32)> {
    let width = i32::try_from(image.width()).unwrap_or(i32::MAX);
    let height = i32::try_from(image.height()).unwrap_or(i32::MAX);
    if width == 0 || height == 0 || right < 0 || bottom < 0 || left >= width || top >= height {
        return None;
    }
    Some((left.max(0), top.max(0), right.min(width - 1), bottom.min(height - 1)))
}

// Bresenham
fn draw_line(image: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let (mut x, mut y) = (x0, y0);
    let mut err = dx + dy;
    loop {
        put(image, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
