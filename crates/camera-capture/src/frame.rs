//! Video frame types and processing

use image::{codecs::jpeg::JpegEncoder, GrayImage, RgbImage};
use std::time::Duration;

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds, monotonic within a source)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u32,
    ) -> Result<Self, CameraError> {
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(CameraError::Buffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        })
    }

    /// Wrap a decoded RGB image
    pub fn from_rgb_image(img: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Capture timestamp as a duration
    pub fn timestamp(&self) -> Duration {
        Duration::from_nanos(self.timestamp_ns)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(idx..idx + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> GrayImage {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = (pixel[0] as f32 * 0.299
                   + pixel[1] as f32 * 0.587
                   + pixel[2] as f32 * 0.114) as u8;
            gray.push(y);
        }
        // Length is width * height by construction
        GrayImage::from_raw(self.width, self.height, gray)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Copy the pixels into an owned RGB image for drawing
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(CameraError::Buffer {
            expected: (self.width as usize) * (self.height as usize) * 3,
            actual: self.data.len(),
        })
    }

    /// Encode the frame as JPEG
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        encode_jpeg(&self.to_rgb_image()?, quality)
    }
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, CameraError> {
    let mut buf = Vec::with_capacity(img.as_raw().len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode_image(img)
        .map_err(|e| CameraError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> VideoFrame {
        let data = rgb.iter().copied().cycle().take((width * height * 3) as usize).collect();
        VideoFrame::new(data, width, height, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_short_buffer() {
        let err = VideoFrame::new(vec![0; 10], 2, 2, 0, 0).unwrap_err();
        assert!(matches!(err, CameraError::Buffer { expected: 12, actual: 10 }));
    }

    #[test]
    fn test_get_pixel_bounds() {
        let frame = solid(4, 3, [10, 20, 30]);
        assert_eq!(frame.get_pixel(3, 2), Some([10, 20, 30]));
        assert_eq!(frame.get_pixel(4, 0), None);
    }

    #[test]
    fn test_get_pixel_index_does_not_wrap() {
        // (y * width + x) * 3 exceeds u32::MAX here
        let frame = VideoFrame {
            data: vec![7; 12],
            width: 1 << 31,
            height: 4,
            timestamp_ns: 0,
            sequence: 0,
        };
        assert_eq!(frame.get_pixel(0, 0), Some([7, 7, 7]));
        assert_eq!(frame.get_pixel(1, 3), None);
    }

    #[test]
    fn test_grayscale_luminance() {
        let white = solid(2, 2, [255, 255, 255]).to_grayscale();
        assert!(white.pixels().all(|p| p.0[0] >= 254));

        let black = solid(2, 2, [0, 0, 0]).to_grayscale();
        assert!(black.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_encode_jpeg_produces_jfif() {
        let jpeg = solid(16, 16, [0, 128, 255]).encode_jpeg(80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_timestamp_duration() {
        let mut frame = solid(1, 1, [0, 0, 0]);
        frame.timestamp_ns = 1_500_000_000;
        assert_eq!(frame.timestamp(), Duration::from_millis(1500));
    }
}
