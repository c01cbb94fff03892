//! Detector capability used by the agent workers

use crate::error::VisionError;
use crate::frame::Frame;
use async_trait::async_trait;
use augv_core::BoundingBox;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One raw detector result, before any geometry is applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    /// Center-based box in frame pixels
    pub bbox: BoundingBox,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Image in, labeled boxes out.
///
/// Implementations must be safe to share across agent workers; each call is
/// independent and carries no per-agent state.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Run detection on a frame, returning results at or above `confidence_threshold`
    async fn detect(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectedObject>, VisionError>;
}

/// Drop results below the threshold and any with unusable geometry
pub fn retain_confident(objects: Vec<DetectedObject>, confidence_threshold: f32) -> Vec<DetectedObject> {
    let before = objects.len();
    let kept: Vec<DetectedObject> = objects
        .into_iter()
        .filter(|o| o.confidence.is_finite() && o.confidence >= confidence_threshold)
        .filter(|o| o.bbox.is_finite() && o.bbox.w >= 0.0 && o.bbox.h >= 0.0)
        .collect();
    if kept.len() != before {
        debug!("Filtered {} of {} detections", before - kept.len(), before);
    }
    kept
}

/// Detector that never reports anything; used when no inference backend is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

#[async_trait]
impl Detector for NullDetector {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn detect(
        &self,
        _frame: &Frame,
        _confidence_threshold: f32,
    ) -> Result<Vec<DetectedObject>, VisionError> {
        Ok(Vec::new())
    }
}
