//! Geometry helpers for document detection and rectification.
//!
//! Corner ordering, distances, polygon areas and the area-based confidence
//! ramp used by the detector.

use serde::{Deserialize, Serialize};

/// A point in frame-pixel coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f32 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Signed shoelace sum over a closed polygon.
fn shoelace(points: &[Point]) -> f32 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].y;
        sum -= points[j].x * points[i].y;
    }
    sum
}

/// Enclosed area of a closed polygon.
pub fn polygon_area(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    shoelace(points).abs() / 2.0
}

/// A detected document boundary: exactly four corners in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    pub corners: [Point; 4],
}

impl Quadrilateral {
    pub fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// Enclosed area via the shoelace formula.
    pub fn area(&self) -> f32 {
        polygon_area(&self.corners)
    }

    pub fn centroid(&self) -> Point {
        let cx = self.corners.iter().map(|p| p.x).sum::<f32>() / 4.0;
        let cy = self.corners.iter().map(|p| p.y).sum::<f32>() / 4.0;
        Point::new(cx, cy)
    }

    /// True when the boundary does not self-intersect.
    ///
    /// Only the two pairs of opposite edges can cross; adjacent edges share
    /// an endpoint by construction.
    pub fn is_simple(&self) -> bool {
        let [a, b, c, d] = self.corners;
        !segments_intersect(a, b, c, d) && !segments_intersect(b, c, d, a)
    }

    /// Corners in canonical order: top-left first, then clockwise.
    ///
    /// Sorts by angle around the centroid (clockwise in image coordinates),
    /// then rotates the cycle so the corner with minimal x + y leads.
    pub fn ordered(&self) -> Quadrilateral {
        let center = self.centroid();
        let mut sorted = self.corners;
        sorted.sort_by(|a, b| {
            let angle_a = (a.y - center.y).atan2(a.x - center.x);
            let angle_b = (b.y - center.y).atan2(b.x - center.x);
            angle_a.partial_cmp(&angle_b).unwrap_or(std::cmp::Ordering::Equal)
        });

        let start = sorted
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.x + a.y)
                    .partial_cmp(&(b.x + b.y))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut ordered = [sorted[0]; 4];
        for (i, slot) in ordered.iter_mut().enumerate() {
            *slot = sorted[(start + i) % 4];
        }
        Quadrilateral::new(ordered)
    }
}

/// Orientation of the triple (a, b, c): sign gives the turn direction,
/// zero means collinear.
fn orientation(a: Point, b: Point, c: Point) -> f32 {
    (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y)
}

/// Proper intersection test for segments ab and cd. Shared endpoints and
/// collinear touching do not count.
fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    (o1 * o2 < 0.0) && (o3 * o4 < 0.0)
}

/// Normalize an enclosed area into a [0.1, 1.0] confidence.
///
/// Linear ramp across [band_min, band_max]; areas at or below the band floor
/// get the 0.1 confidence floor, areas at or above the ceiling get 1.0.
pub fn area_confidence(area: f32, band_min: f32, band_max: f32) -> f32 {
    if band_max <= band_min {
        return 0.1;
    }
    let normalized = ((area - band_min) / (band_max - band_min)).clamp(0.0, 1.0);
    normalized * 0.9 + 0.1
}
