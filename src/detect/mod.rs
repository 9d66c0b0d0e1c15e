//! Document Detection Layer
//!
//! Per-frame rectangular document detection: grayscale, Gaussian smoothing,
//! Canny edges, external contours, polygon simplification, then the largest
//! 4-vertex candidate inside the area band wins. Bounded, synchronous work
//! sized for one animation-frame tick.

use std::cell::Cell;

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::frame::Frame;
use crate::geometry::{area_confidence, polygon_area, Point, Quadrilateral};

/// Detector backend, selected at startup via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// Edge/contour analysis on every frame.
    #[default]
    Edge,
    /// Degraded mode: no vision backend, never reports a detection.
    Disabled,
}

/// Tuning for the edge-based detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backend: DetectorBackend,
    /// Gaussian smoothing sigma applied before edge detection.
    pub blur_sigma: f32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Contours outside this enclosed-area band are rejected (px²).
    pub min_contour_area: f32,
    pub max_contour_area: f32,
    /// Polygon simplification tolerance as a fraction of the perimeter.
    pub approx_epsilon: f64,
    /// Confidence ramp band (px²); rewards mid-to-large, well-framed
    /// documents. Not the same bounds as the contour filter.
    pub confidence_min_area: f32,
    pub confidence_max_area: f32,
    /// Upper bound on contours examined per frame, keeps a tick bounded.
    pub max_contours: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Edge,
            blur_sigma: 1.4,
            canny_low: 50.0,
            canny_high: 150.0,
            min_contour_area: 5_000.0,
            max_contour_area: 100_000.0,
            approx_epsilon: 0.02,
            confidence_min_area: 10_000.0,
            confidence_max_area: 200_000.0,
            max_contours: 512,
        }
    }
}

/// Outcome of one detection pass. Recomputed every tick and superseded by
/// the next tick's result.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub found: bool,
    pub quad: Option<Quadrilateral>,
    pub confidence: f32,
}

impl DetectionResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            quad: None,
            confidence: 0.0,
        }
    }

    pub fn found(quad: Quadrilateral, confidence: f32) -> Self {
        Self {
            found: true,
            quad: Some(quad),
            confidence,
        }
    }
}

/// Per-frame document detection. Must complete within a frame budget and
/// has no side effects; overlay drawing is the caller's responsibility.
pub trait DocumentDetector {
    fn detect(&self, frame: &Frame) -> DetectionResult;
}

/// Build the configured detector backend.
pub fn build_detector(config: &DetectorConfig) -> Box<dyn DocumentDetector> {
    match config.backend {
        DetectorBackend::Edge => Box::new(EdgeDetector::new(config.clone())),
        DetectorBackend::Disabled => Box::new(DisabledDetector::new()),
    }
}

/// Edge/contour document detector.
pub struct EdgeDetector {
    config: DetectorConfig,
}

impl EdgeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    fn edge_map(&self, frame: &Frame) -> GrayImage {
        let gray = image::imageops::grayscale(frame.pixels());
        let blurred = gaussian_blur_f32(&gray, self.config.blur_sigma);
        canny(&blurred, self.config.canny_low, self.config.canny_high)
    }

    /// Largest simplified 4-vertex contour inside the area band.
    fn best_quadrilateral(&self, edges: &GrayImage) -> Option<(Quadrilateral, f32)> {
        let contours = find_contours::<i32>(edges);
        let mut best: Option<(Quadrilateral, f32)> = None;

        for contour in contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .take(self.config.max_contours)
        {
            let points: Vec<Point> = contour
                .points
                .iter()
                .map(|p| Point::new(p.x as f32, p.y as f32))
                .collect();
            let area = polygon_area(&points);
            if area < self.config.min_contour_area || area > self.config.max_contour_area {
                continue;
            }

            let perimeter = arc_length(&contour.points, true);
            let epsilon = self.config.approx_epsilon * perimeter;
            let simplified = approximate_polygon_dp(&contour.points, epsilon, true);
            if simplified.len() != 4 {
                continue;
            }

            let corners = [
                Point::new(simplified[0].x as f32, simplified[0].y as f32),
                Point::new(simplified[1].x as f32, simplified[1].y as f32),
                Point::new(simplified[2].x as f32, simplified[2].y as f32),
                Point::new(simplified[3].x as f32, simplified[3].y as f32),
            ];
            let quad = Quadrilateral::new(corners).ordered();
            if !quad.is_simple() {
                continue;
            }

            let quad_area = quad.area();
            if best.map_or(true, |(_, a)| quad_area > a) {
                best = Some((quad, quad_area));
            }
        }

        best
    }
}

impl DocumentDetector for EdgeDetector {
    fn detect(&self, frame: &Frame) -> DetectionResult {
        let edges = self.edge_map(frame);

        match self.best_quadrilateral(&edges) {
            Some((quad, area)) => {
                let confidence = area_confidence(
                    area,
                    self.config.confidence_min_area,
                    self.config.confidence_max_area,
                );
                debug!("Document detected: area {:.0} px², confidence {:.2}", area, confidence);
                DetectionResult::found(quad, confidence)
            }
            None => DetectionResult::not_found(),
        }
    }
}

/// Stand-in used when no vision backend is configured.
///
/// Always reports "not found" and leaves capture to the manual flow; a
/// synthetic detection would feed garbage into rectification.
pub struct DisabledDetector {
    warned: Cell<bool>,
}

impl DisabledDetector {
    pub fn new() -> Self {
        Self {
            warned: Cell::new(false),
        }
    }
}

impl Default for DisabledDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentDetector for DisabledDetector {
    fn detect(&self, _frame: &Frame) -> DetectionResult {
        if !self.warned.get() {
            warn!("Document detection disabled: running without a vision backend");
            self.warned.set(true);
        }
        DetectionResult::not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    /// Dark background with a bright document-like rectangle.
    fn synthetic_document_frame(x: i32, y: i32, w: u32, h: u32) -> Frame {
        let mut image = RgbaImage::from_pixel(640, 480, Rgba([20, 20, 20, 255]));
        draw_filled_rect_mut(
            &mut image,
            Rect::at(x, y).of_size(w, h),
            Rgba([235, 235, 235, 255]),
        );
        Frame::new(image)
    }

    #[test]
    fn test_detects_document_rectangle() {
        let detector = EdgeDetector::new(DetectorConfig::default());
        let frame = synthetic_document_frame(150, 120, 300, 200);

        let result = detector.detect(&frame);
        assert!(result.found);
        assert!((0.1..=1.0).contains(&result.confidence));

        let quad = result.quad.expect("found detections carry a quadrilateral");
        assert!(quad.is_simple());
        // Enclosed area close to the drawn rectangle.
        let area = quad.area();
        assert!(
            (50_000.0..70_000.0).contains(&area),
            "unexpected area {area}"
        );
        // Canonical ordering: top-left corner leads.
        let first = quad.corners[0];
        assert!((first.x - 150.0).abs() < 10.0, "x was {}", first.x);
        assert!((first.y - 120.0).abs() < 10.0, "y was {}", first.y);
    }

    #[test]
    fn test_blank_frame_reports_not_found() {
        let detector = EdgeDetector::new(DetectorConfig::default());
        let frame = Frame::new(RgbaImage::from_pixel(640, 480, Rgba([90, 90, 90, 255])));

        let result = detector.detect(&frame);
        assert!(!result.found);
        assert!(result.quad.is_none());
    }

    #[test]
    fn test_rejects_rectangle_below_area_floor() {
        let detector = EdgeDetector::new(DetectorConfig::default());
        // 60x60 = 3,600 px², under the 5,000 px² floor.
        let frame = synthetic_document_frame(300, 200, 60, 60);

        let result = detector.detect(&frame);
        assert!(!result.found);
    }

    #[test]
    fn test_larger_document_scores_higher() {
        let detector = EdgeDetector::new(DetectorConfig::default());
        let small = detector.detect(&synthetic_document_frame(250, 180, 140, 120));
        let large = detector.detect(&synthetic_document_frame(150, 120, 320, 260));

        assert!(small.found && large.found);
        assert!(large.confidence >= small.confidence);
    }

    #[test]
    fn test_disabled_backend_never_detects() {
        let detector = DisabledDetector::new();
        let frame = synthetic_document_frame(150, 120, 300, 200);

        for _ in 0..3 {
            let result = detector.detect(&frame);
            assert!(!result.found);
            assert_eq!(result.confidence, 0.0);
        }
    }

    #[test]
    fn test_build_detector_honors_backend() {
        let config = DetectorConfig {
            backend: DetectorBackend::Disabled,
            ..Default::default()
        };
        let detector = build_detector(&config);
        let frame = synthetic_document_frame(150, 120, 300, 200);
        assert!(!detector.detect(&frame).found);
    }
}
