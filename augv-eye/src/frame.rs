//! Decoded camera frames

use crate::error::VisionError;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;

/// One decoded RGB frame, exclusively owned by whoever is processing it
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Decode an encoded image (JPEG, PNG, ...) as sent over the agent stream
    pub fn decode(bytes: &[u8]) -> Result<Self, VisionError> {
        if bytes.is_empty() {
            return Err(VisionError::Decode("empty frame".to_string()));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| VisionError::Decode(e.to_string()))?
            .to_rgb8();
        Self::from_rgb(image)
    }

    /// Wrap a raw BGR24 buffer as uploaded by the simulation's HTTP path
    pub fn from_bgr(bytes: &[u8], width: u32, height: u32) -> Result<Self, VisionError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| VisionError::Decode("frame dimensions overflow".to_string()))?;
        if bytes.len() != expected {
            return Err(VisionError::Decode(format!(
                "expected {} bytes for {}x{} BGR frame, got {}",
                expected,
                width,
                height,
                bytes.len()
            )));
        }

        let mut rgb = Vec::with_capacity(expected);
        for px in bytes.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        let image = RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| VisionError::Decode("buffer does not match dimensions".to_string()))?;
        Self::from_rgb(image)
    }

    pub fn from_rgb(image: RgbImage) -> Result<Self, VisionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::Decode("zero-sized frame".to_string()));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Re-encode for transports that need a self-describing image
    pub fn to_png(&self) -> Result<Vec<u8>, VisionError> {
        self.encode(ImageOutputFormat::Png)
    }

    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, VisionError> {
        self.encode(ImageOutputFormat::Jpeg(quality.clamp(1, 100)))
    }

    fn encode(&self, format: ImageOutputFormat) -> Result<Vec<u8>, VisionError> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.image.clone()).write_to(&mut buffer, format)?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    #[test]
    fn test_decode_png_roundtrip_keeps_size() {
        let frame = Frame::from_rgb(solid(16, 12, [10, 20, 30])).unwrap();
        let png = frame.to_png().unwrap();
        let decoded = Frame::decode(&png).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 12);
        assert_eq!(decoded.as_rgb().get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Frame::decode(b"definitely not an image").unwrap_err();
        assert!(err.is_decode());
        assert!(Frame::decode(&[]).unwrap_err().is_decode());
    }

    #[test]
    fn test_from_bgr_swaps_channels() {
        // one blue pixel in BGR order
        let frame = Frame::from_bgr(&[255, 0, 0], 1, 1).unwrap();
        assert_eq!(frame.as_rgb().get_pixel(0, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_from_bgr_length_mismatch() {
        let err = Frame::from_bgr(&[0u8; 10], 2, 2).unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("expected 12 bytes"));
    }

    #[test]
    fn test_zero_sized_frame_rejected() {
        assert!(Frame::from_bgr(&[], 0, 0).is_err());
    }
}
