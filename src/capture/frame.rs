//! Frame value objects produced by frame sources.

use image::RgbaImage;
use std::time::Instant;

/// An immutable RGBA snapshot taken from a frame source.
///
/// Created once per tick and discarded after use, except when retained as a
/// capture. Pipeline stages receive frames by reference and never mutate
/// them.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbaImage,
    timestamp: Instant,
}

impl Frame {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            timestamp: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Frame dimensions as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// When the frame was taken from the source.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_dimensions() {
        let frame = Frame::new(RgbaImage::new(640, 480));
        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
    }
}
