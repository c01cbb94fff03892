//! HTTP inference backend

use crate::detector::{retain_confident, DetectedObject, Detector};
use crate::error::VisionError;
use crate::frame::Frame;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Largest response body accepted from the inference service
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Detector backed by a YOLO-style HTTP service.
///
/// The frame is posted as a PNG body to `endpoint?conf=<threshold>` and the
/// service answers with `[{"label", "confidence", "bbox": [cx, cy, w, h]}]`.
pub struct RemoteDetector {
    client: Client,
    endpoint: String,
}

impl RemoteDetector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, VisionError> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(VisionError::Detector(format!(
                "Invalid detector endpoint: {}",
                endpoint
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn detect(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectedObject>, VisionError> {
        let body = frame.to_png()?;
        debug!(
            "Posting {}x{} frame ({} bytes) to {}",
            frame.width(),
            frame.height(),
            body.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("conf", confidence_threshold)])
            .header("Content-Type", "image/png")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VisionError::Detector(format!(
                "Detector returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(VisionError::Detector(format!(
                "Detector response too large: {} bytes",
                bytes.len()
            )));
        }

        let objects: Vec<DetectedObject> = serde_json::from_slice(&bytes)
            .map_err(|e| VisionError::Detector(format!("Malformed detector response: {}", e)))?;

        Ok(retain_confident(objects, confidence_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_endpoint() {
        assert!(RemoteDetector::new("ftp://yolo", Duration::from_secs(1)).is_err());
        let detector = RemoteDetector::new("http://127.0.0.1:9/detect", Duration::from_secs(1)).unwrap();
        assert_eq!(detector.endpoint(), "http://127.0.0.1:9/detect");
        assert_eq!(detector.name(), "remote");
    }
}
