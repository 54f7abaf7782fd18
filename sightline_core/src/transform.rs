// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-major 4×4 layer transform and its projection onto the 2-D plane.
//!
//! Layers position themselves with a full 3-D affine transform, but visibility
//! is measured in one flat global coordinate space. [`Transform3d::map_rect`]
//! is the coordinate-conversion primitive: it maps a local rectangle into that
//! space and returns the axis-aligned box around the result.

use core::ops::Mul;

use kurbo::{Point, Rect};

/// A column-major 4×4 affine transform stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a pure translation transform.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a non-uniform scale transform.
    #[inline]
    #[must_use]
    pub const fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            cols: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Maps a point on the `z = 0` plane and drops the resulting depth.
    ///
    /// A perspective component (`w != 1`) is divided out. A degenerate
    /// `w == 0` maps to the undivided coordinates.
    #[must_use]
    pub fn map_point(&self, p: Point) -> Point {
        let c = &self.cols;
        let x = c[0][0] * p.x + c[1][0] * p.y + c[3][0];
        let y = c[0][1] * p.x + c[1][1] * p.y + c[3][1];
        let w = c[0][3] * p.x + c[1][3] * p.y + c[3][3];
        if w == 0.0 || w == 1.0 {
            Point::new(x, y)
        } else {
            Point::new(x / w, y / w)
        }
    }

    /// Maps a rectangle and returns the axis-aligned bounding box of its four
    /// transformed corners.
    #[must_use]
    pub fn map_rect(&self, rect: Rect) -> Rect {
        let a = self.map_point(Point::new(rect.x0, rect.y0));
        let b = self.map_point(Point::new(rect.x1, rect.y0));
        let c = self.map_point(Point::new(rect.x0, rect.y1));
        let d = self.map_point(Point::new(rect.x1, rect.y1));
        Rect::from_points(a, d).union_pt(b).union_pt(c)
    }

    /// Is every element of this transform finite?
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        for (j, col) in out.iter_mut().enumerate() {
            for (i, cell) in col.iter_mut().enumerate() {
                *cell = a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
            }
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_composition() {
        let a = Transform3d::from_translation(1.0, 0.0, 0.0);
        let b = Transform3d::from_translation(0.0, 2.0, 0.0);
        assert_eq!((a * b).col(3), [1.0, 2.0, 0.0, 1.0]);
        assert_eq!(Transform3d::IDENTITY * a, a);
    }

    #[test]
    fn map_rect_translates_and_scales() {
        let t = Transform3d::from_translation(10.0, 20.0, 0.0) * Transform3d::from_scale(2.0, 3.0, 1.0);
        let mapped = t.map_rect(Rect::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(mapped, Rect::new(10.0, 20.0, 20.0, 35.0));
    }

    #[test]
    fn map_rect_under_rotation_is_bounding_box() {
        // 90 degrees around Z: (x, y) -> (-y, x).
        let r = Transform3d {
            cols: [
                [0.0, 1.0, 0.0, 0.0],
                [-1.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        };
        let mapped = r.map_rect(Rect::new(0.0, 0.0, 10.0, 4.0));
        assert_eq!(mapped, Rect::new(-4.0, 0.0, 0.0, 10.0));
    }

    #[test]
    fn perspective_is_divided_out() {
        let mut t = Transform3d::IDENTITY;
        t.cols[3][3] = 2.0;
        assert_eq!(t.map_point(Point::new(4.0, 8.0)), Point::new(2.0, 4.0));
    }

    #[test]
    fn non_finite_detected() {
        let mut t = Transform3d::IDENTITY;
        assert!(t.is_finite());
        t.cols[2][1] = f64::NAN;
        assert!(!t.is_finite());
    }
}
