// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clip shape types for scroll and clip contexts.

use kurbo::Rect;

/// A shape used to clip a layer's content and descendants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClipShape {
    /// An axis-aligned rectangle.
    Rect(Rect),
    /// A rectangle with rounded corners.
    RoundedRect(kurbo::RoundedRect),
}

impl ClipShape {
    /// Returns the rectangle used for visibility math.
    ///
    /// Rounded corners are ignored; visibility is measured with rectangle
    /// overlap only.
    #[must_use]
    pub fn bounding_rect(&self) -> Rect {
        match self {
            Self::Rect(r) => *r,
            Self::RoundedRect(rr) => rr.rect(),
        }
    }
}
