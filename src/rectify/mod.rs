//! Perspective Rectification Layer
//!
//! Takes a captured frame plus a detected quadrilateral and produces a
//! deskewed, orientation-corrected, fill-normalized document image. Every
//! input yields a usable image: when warping cannot be set up the stage
//! falls back to a contrast-boosted copy of the frame.

use std::io::Cursor;

use base64::Engine;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::frame::Frame;
use crate::geometry::{distance, Quadrilateral};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifierConfig {
    /// Fraction of the output canvas the document should fill after
    /// normalization.
    pub fill_ratio: f32,
    /// Rotate portrait results 180°. Receipts are usually captured
    /// upside-down when held toward a rear camera; this is a heuristic and
    /// gets the orientation wrong for some inputs.
    pub rotate_portrait: bool,
    /// Contrast boost applied in the fallback path.
    pub fallback_contrast: f32,
}

impl Default for RectifierConfig {
    fn default() -> Self {
        Self {
            fill_ratio: 0.8,
            rotate_portrait: true,
            fallback_contrast: 12.0,
        }
    }
}

/// Result of rectification. `rectified` is false when the fallback path
/// produced the image.
#[derive(Debug, Clone)]
pub struct RectifiedImage {
    pub image: RgbaImage,
    pub rectified: bool,
}

impl RectifiedImage {
    /// PNG-encode the image.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// PNG data URL, the exchange format the recognizer backends accept.
    pub fn to_data_url(&self) -> Result<String, image::ImageError> {
        let bytes = self.to_png_bytes()?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:image/png;base64,{encoded}"))
    }
}

/// Deskews detected documents; never fails, degrading to a contrast-boosted
/// copy when the geometry is unusable.
pub struct Rectifier {
    config: RectifierConfig,
}

impl Rectifier {
    pub fn new(config: RectifierConfig) -> Self {
        Self { config }
    }

    /// Rectify `frame` against the detected boundary.
    pub fn rectify(&self, frame: &Frame, quad: &Quadrilateral) -> RectifiedImage {
        match self.warp(frame, quad) {
            Some(warped) => {
                let oriented = self.correct_orientation(warped);
                let normalized = self.normalize_fill(oriented);
                RectifiedImage {
                    image: normalized,
                    rectified: true,
                }
            }
            None => {
                warn!("Rectification fell back to contrast-boosted copy");
                self.fallback(frame)
            }
        }
    }

    /// Contrast-boosted copy of the raw frame, used when warping is not
    /// possible.
    pub fn fallback(&self, frame: &Frame) -> RectifiedImage {
        RectifiedImage {
            image: imageops::contrast(frame.pixels(), self.config.fallback_contrast),
            rectified: false,
        }
    }

    fn warp(&self, frame: &Frame, quad: &Quadrilateral) -> Option<RgbaImage> {
        let ordered = quad.ordered();
        let [tl, tr, br, bl] = ordered.corners;

        // Target size from the longer of each pair of opposing edges.
        let width = distance(tl, tr).max(distance(br, bl)).round();
        let height = distance(tl, bl).max(distance(tr, br)).round();
        if width < 2.0 || height < 2.0 {
            debug!("Degenerate quadrilateral: {width}x{height}");
            return None;
        }
        let (w, h) = (width as u32, height as u32);

        let from = [(tl.x, tl.y), (tr.x, tr.y), (br.x, br.y), (bl.x, bl.y)];
        let to = [
            (0.0, 0.0),
            (width, 0.0),
            (width, height),
            (0.0, height),
        ];
        // warp_into samples the source through the inverse, so the mapping
        // is given source quad to destination rectangle.
        let projection = Projection::from_control_points(from, to)?;

        let mut output = RgbaImage::new(w, h);
        warp_into(
            frame.pixels(),
            &projection,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 255]),
            &mut output,
        );
        Some(output)
    }

    fn correct_orientation(&self, image: RgbaImage) -> RgbaImage {
        if self.config.rotate_portrait && image.height() > image.width() {
            imageops::rotate180(&image)
        } else {
            image
        }
    }

    /// Scale to the fill ratio and center on a black canvas of the original
    /// size, so downstream consumers see a consistent margin.
    fn normalize_fill(&self, image: RgbaImage) -> RgbaImage {
        let ratio = self.config.fill_ratio.clamp(0.05, 1.0);
        let (w, h) = image.dimensions();
        let inner_w = ((w as f32 * ratio) as u32).max(1);
        let inner_h = ((h as f32 * ratio) as u32).max(1);
        let scaled = imageops::resize(&image, inner_w, inner_h, FilterType::Triangle);

        let mut canvas = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
        let x = i64::from((w - inner_w) / 2);
        let y = i64::from((h - inner_h) / 2);
        imageops::overlay(&mut canvas, &scaled, x, y);
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn frame_with_rect() -> Frame {
        let mut image = RgbaImage::from_pixel(640, 480, Rgba([15, 15, 15, 255]));
        draw_filled_rect_mut(
            &mut image,
            Rect::at(150, 120).of_size(300, 200),
            Rgba([230, 230, 230, 255]),
        );
        Frame::new(image)
    }

    fn rect_quad() -> Quadrilateral {
        Quadrilateral::new([
            Point::new(150.0, 120.0),
            Point::new(450.0, 120.0),
            Point::new(450.0, 320.0),
            Point::new(150.0, 320.0),
        ])
    }

    #[test]
    fn test_rectifies_axis_aligned_quad() {
        let rectifier = Rectifier::new(RectifierConfig::default());
        let result = rectifier.rectify(&frame_with_rect(), &rect_quad());

        assert!(result.rectified);
        // Landscape output sized by the quadrilateral edges.
        assert_eq!(result.image.dimensions(), (300, 200));
    }

    #[test]
    fn test_fill_normalization_centers_content() {
        let rectifier = Rectifier::new(RectifierConfig::default());
        let result = rectifier.rectify(&frame_with_rect(), &rect_quad());

        // Border pixels are padding after the 0.8 fill scale.
        assert_eq!(*result.image.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        let (w, h) = result.image.dimensions();
        // Center still holds document content.
        let center = result.image.get_pixel(w / 2, h / 2);
        assert!(center[0] > 100);
    }

    #[test]
    fn test_portrait_result_is_rotated_not_resized() {
        let rectifier = Rectifier::new(RectifierConfig::default());
        // Tall quadrilateral over the same frame.
        let quad = Quadrilateral::new([
            Point::new(200.0, 50.0),
            Point::new(380.0, 50.0),
            Point::new(380.0, 430.0),
            Point::new(200.0, 430.0),
        ]);
        let result = rectifier.rectify(&frame_with_rect(), &quad);
        assert!(result.rectified);
        // Rotation preserves dimensions; portrait stays portrait.
        assert_eq!(result.image.dimensions(), (180, 380));
    }

    #[test]
    fn test_degenerate_quad_falls_back() {
        let rectifier = Rectifier::new(RectifierConfig::default());
        let quad = Quadrilateral::new([
            Point::new(100.0, 100.0),
            Point::new(100.5, 100.0),
            Point::new(100.5, 100.5),
            Point::new(100.0, 100.5),
        ]);
        let frame = frame_with_rect();
        let result = rectifier.rectify(&frame, &quad);

        assert!(!result.rectified);
        // Fallback keeps the full frame.
        assert_eq!(result.image.dimensions(), frame.dimensions());
    }

    #[test]
    fn test_data_url_shape() {
        let rectifier = Rectifier::new(RectifierConfig::default());
        let result = rectifier.rectify(&frame_with_rect(), &rect_quad());
        let url = result.to_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(url.len() > 30);
    }
}
