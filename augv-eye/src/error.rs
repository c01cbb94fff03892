//! Error types for augv-eye

use thiserror::Error;
use augv_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl VisionError {
    /// Failures caused by the inbound frame itself rather than the pipeline
    pub fn is_decode(&self) -> bool {
        matches!(self, VisionError::Decode(_))
    }
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Io(e) => CoreError::Io(e),
            other => CoreError::Serialization(format!("Vision error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Detector("model offline".to_string());
        assert!(err.to_string().contains("Detector error"));
        assert!(err.to_string().contains("model offline"));
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let vision_err: VisionError = io_err.into();
        match vision_err {
            VisionError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_vision_error_to_core_error() {
        let core_err: CoreError = VisionError::Decode("truncated".to_string()).into();
        match core_err {
            CoreError::Serialization(msg) => {
                assert!(msg.contains("Vision error"));
                assert!(msg.contains("truncated"));
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_is_decode() {
        assert!(VisionError::Decode("x".to_string()).is_decode());
        assert!(!VisionError::Processing("x".to_string()).is_decode());
    }
}
