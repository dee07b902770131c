//! Four-corner bounding boxes.
//!
//! A [`BoundingBox`] keeps all four corners rather than min/max extents so
//! that rotated and skewed sprites keep an exact outline. Min/max values
//! are derived on demand for broad-phase queries.

use glam::{Mat4, Vec2};
use serde::{Deserialize, Serialize};

/// Four corner points of an object's outline plus derived min/max extents.
///
/// Two box variants are modeled per object: the *hit-test box* (world
/// space, viewport-independent) and the *render box* (screen space,
/// viewport- and parallax-adjusted). Both share this representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Bottom-left corner.
    pub bottom_left: Vec2,
    /// Bottom-right corner.
    pub bottom_right: Vec2,
    /// Top-left corner.
    pub top_left: Vec2,
    /// Top-right corner.
    pub top_right: Vec2,
}

impl BoundingBox {
    /// Creates a box from its four corners.
    pub const fn new(
        bottom_left: Vec2,
        bottom_right: Vec2,
        top_left: Vec2,
        top_right: Vec2,
    ) -> Self {
        Self {
            bottom_left,
            bottom_right,
            top_left,
            top_right,
        }
    }

    /// Creates an axis-aligned box from min/max extents.
    pub const fn axis_aligned(min: Vec2, max: Vec2) -> Self {
        Self {
            bottom_left: min,
            bottom_right: Vec2::new(max.x, min.y),
            top_left: Vec2::new(min.x, max.y),
            top_right: max,
        }
    }

    fn corners(&self) -> [Vec2; 4] {
        [
            self.bottom_left,
            self.bottom_right,
            self.top_right,
            self.top_left,
        ]
    }

    /// Smallest X across the corners.
    pub fn min_x(&self) -> f32 {
        self.corners().iter().map(|c| c.x).fold(f32::INFINITY, f32::min)
    }

    /// Largest X across the corners.
    pub fn max_x(&self) -> f32 {
        self.corners()
            .iter()
            .map(|c| c.x)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Smallest Y across the corners.
    pub fn min_y(&self) -> f32 {
        self.corners().iter().map(|c| c.y).fold(f32::INFINITY, f32::min)
    }

    /// Largest Y across the corners.
    pub fn max_y(&self) -> f32 {
        self.corners()
            .iter()
            .map(|c| c.y)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Axis-aligned width of the outline.
    pub fn width(&self) -> f32 {
        self.max_x() - self.min_x()
    }

    /// Axis-aligned height of the outline.
    pub fn height(&self) -> f32 {
        self.max_y() - self.min_y()
    }

    /// Whether `point` lies inside the box, corners and edges included.
    ///
    /// Works for rotated and mirrored boxes (any winding). A degenerate box
    /// with zero area (zero width or height) contains no points.
    pub fn contains(&self, point: Vec2) -> bool {
        let corners = self.corners();

        // Twice the signed polygon area; zero means degenerate.
        let mut doubled_area = 0.0;
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            doubled_area += a.x * b.y - b.x * a.y;
        }
        if doubled_area == 0.0 {
            return false;
        }

        let winding = doubled_area.signum();
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            let edge = b - a;
            let to_point = point - a;
            if winding * (edge.x * to_point.y - edge.y * to_point.x) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Returns this box with every corner run through `matrix`.
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let apply = |corner: Vec2| matrix.transform_point3(corner.extend(0.0)).truncate();
        Self {
            bottom_left: apply(self.bottom_left),
            bottom_right: apply(self.bottom_right),
            top_left: apply(self.top_left),
            top_right: apply(self.top_right),
        }
    }
}
