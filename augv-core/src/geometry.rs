//! Camera-to-ground projection
//!
//! Maps an image-space point onto the ground plane in front of the agent and
//! buckets it into whole grid cells. The camera is mounted at a fixed height
//! and forward offset from the agent's node center and tilted downwards.
//! Agent-local axes: `x` to the right, `y` up, `z` forward.

use crate::GridOffset;
use serde::{Deserialize, Serialize};

/// Fixed intrinsics/extrinsics of the agent camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraModel {
    /// Camera height above ground (meters)
    pub height: f64,
    /// Camera forward offset from the node center (meters)
    pub forward_offset: f64,
    /// Node center along the forward axis (grid units)
    pub node_center: f64,
    /// Downward tilt around the x axis (degrees)
    pub tilt_deg: f64,
    /// Vertical field of view (degrees)
    pub vertical_fov_deg: f64,
    /// Edge length of one grid cell (meters)
    pub grid_size: f64,
}

impl Default for CameraModel {
    fn default() -> Self {
        Self {
            height: 0.6,
            forward_offset: 0.31,
            node_center: 0.5,
            tilt_deg: 20.0,
            vertical_fov_deg: 90.0,
            grid_size: 1.0,
        }
    }
}

/// Ground-plane intersection of a pixel ray, in agent-local meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPoint {
    pub x: f64,
    pub z: f64,
}

impl GroundPoint {
    pub fn distance(&self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }
}

/// Forward bias added before bucketing, growing with distance to offset
/// perspective foreshortening
pub fn distance_bias(distance: f64) -> f64 {
    if distance <= 2.0 {
        0.2
    } else if distance <= 4.0 {
        0.5
    } else if distance <= 6.0 {
        0.8
    } else {
        1.2
    }
}

impl CameraModel {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err("camera.height must be positive".to_string());
        }
        if !(self.vertical_fov_deg > 0.0 && self.vertical_fov_deg < 180.0) {
            return Err("camera.vertical_fov_deg must be within (0, 180)".to_string());
        }
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            return Err("camera.grid_size must be positive".to_string());
        }
        if !(self.tilt_deg.is_finite() && self.forward_offset.is_finite() && self.node_center.is_finite()) {
            return Err("camera parameters must be finite".to_string());
        }
        Ok(())
    }

    /// Intersect the ray through `(x_img, y_img)` with the ground plane.
    ///
    /// Returns `None` when the rotated ray has no vertical component.
    pub fn ground_point(&self, x_img: f64, y_img: f64, img_w: f64, img_h: f64) -> Option<GroundPoint> {
        let x_ndc = (x_img / img_w - 0.5) * 2.0;
        let y_ndc = (y_img / img_h - 0.5) * 2.0;

        let aspect = img_w / img_h;
        let tan_half_fov = (self.vertical_fov_deg.to_radians() / 2.0).tan();

        let x_cam = x_ndc * tan_half_fov * aspect;
        let y_cam = -y_ndc * tan_half_fov;
        let z_cam = 1.0;

        let (sin_t, cos_t) = self.tilt_deg.to_radians().sin_cos();
        let y_rot = y_cam * cos_t - z_cam * sin_t;
        let z_rot = y_cam * sin_t + z_cam * cos_t;

        if y_rot == 0.0 || !y_rot.is_finite() {
            return None;
        }

        let cam_y = self.height;
        let cam_z = self.node_center + self.forward_offset;
        let t = -cam_y / y_rot;

        Some(GroundPoint {
            x: x_cam * t,
            z: cam_z + z_rot * t,
        })
    }

    /// Project an image point to an agent-relative grid offset
    pub fn project(&self, x_img: f64, y_img: f64, img_w: f64, img_h: f64) -> GridOffset {
        if img_w <= 0.0 || img_h <= 0.0 {
            return GridOffset::new(0, 0);
        }
        let Some(point) = self.ground_point(x_img, y_img, img_w, img_h) else {
            return GridOffset::new(0, 0);
        };
        if !(point.x.is_finite() && point.z.is_finite()) {
            return GridOffset::new(0, 0);
        }

        let bias = distance_bias(point.distance());
        GridOffset::new(
            (point.x / self.grid_size).round() as i32,
            ((point.z + bias) / self.grid_size).round() as i32,
        )
    }
}

/// Project with the default camera mounted on every agent
pub fn project(x_img: f64, y_img: f64, img_w: f64, img_h: f64) -> GridOffset {
    CameraModel::default().project(x_img, y_img, img_w, img_h)
}
