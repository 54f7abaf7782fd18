// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visible-fraction calculation.
//!
//! [`percentage_visible`] measures how much of a target rectangle a user can
//! see, given the viewport of its scroll/clip context and the obstructor
//! records that may cover it:
//!
//! 1. Clip the target to the viewport. Nothing left means 0.
//! 2. If less than half of the target survives clipping, return that fraction
//!    without looking at obstructors.
//! 3. Otherwise subtract the area each visible obstructor covers of the
//!    clipped part. Overlapping obstructors are subtracted once each, so the
//!    result can undershoot when they overlap.
//! 4. Clamp to `[0, 1]` and round to three decimals.
//!
//! Obstructors are found through a [`VisibilityStrategy`].
//! [`RegistryObstructions`] asks an [`ObstructionRegistry`] and is the one to
//! reach for. [`TreeObstructions`] walks a layer subtree for layers flagged
//! as obstructors, for contexts that run without a registry.

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::Rect;

use crate::layer::{LayerId, LayerStore};
use crate::registry::{ObstructionRegistry, Place, TrackedElementRecord, TrackedId};

/// Below this clipped fraction obstructors are not evaluated.
pub const OBSTRUCTION_THRESHOLD: f64 = 0.5;

/// Rounds a fraction to three decimal places.
///
/// NaN and infinities become 0.
#[must_use]
pub fn round_fraction(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 1000.0).round() / 1000.0
}

/// The target after viewport clipping.
struct Clipped {
    visible: Rect,
    visible_area: f64,
    target_area: f64,
}

/// Either the final answer (steps 1 and 2) or the clipped part to subtract
/// obstructions from.
enum Base {
    Done(f64),
    Obstructable(Clipped),
}

fn clip_to_viewport(target: Rect, viewport: Rect) -> Base {
    let target = target.abs();
    let target_area = target.area();
    if !target_area.is_finite() || target_area <= 0.0 {
        return Base::Done(0.0);
    }
    let visible = target.intersect(viewport.abs());
    let visible_area = visible.area();
    if !visible_area.is_finite() || visible_area <= 0.0 {
        return Base::Done(0.0);
    }
    let base = visible_area / target_area;
    if base < OBSTRUCTION_THRESHOLD {
        return Base::Done(round_fraction(base.clamp(0.0, 1.0)));
    }
    Base::Obstructable(Clipped {
        visible,
        visible_area,
        target_area,
    })
}

/// Returns the visible fraction of `target` in `[0, 1]`, rounded to three
/// decimals.
///
/// Records whose own `is_visible` is false never obstruct.
pub fn percentage_visible<'a, I>(target: Rect, viewport: Rect, obstructors: I) -> f64
where
    I: IntoIterator<Item = &'a TrackedElementRecord>,
{
    let clipped = match clip_to_viewport(target, viewport) {
        Base::Done(fraction) => return fraction,
        Base::Obstructable(clipped) => clipped,
    };
    let covered: f64 = obstructors
        .into_iter()
        .filter(|r| r.is_visible)
        .map(|r| r.frame.intersect(clipped.visible).area())
        .sum();
    let fraction = (clipped.visible_area - covered) / clipped.target_area;
    round_fraction(fraction.clamp(0.0, 1.0))
}

/// A source of obstructors for a visibility calculation.
pub trait VisibilityStrategy {
    /// Returns the visible fraction of `target` within `viewport`, in
    /// `[0, 1]`.
    fn percentage_visible(&self, target: Rect, viewport: Rect) -> f64;
}

/// Obstructors from an [`ObstructionRegistry`], scoped to one [`Place`].
#[derive(Clone, Copy, Debug)]
pub struct RegistryObstructions<'a> {
    /// The registry to query.
    pub registry: &'a ObstructionRegistry,
    /// Only records under this place obstruct.
    pub place: Place,
    /// A record to ignore, typically the target's own.
    pub exclude: Option<TrackedId>,
}

impl<'a> RegistryObstructions<'a> {
    /// Queries `registry` for obstructors under `place`.
    #[must_use]
    pub fn new(registry: &'a ObstructionRegistry, place: Place) -> Self {
        Self {
            registry,
            place,
            exclude: None,
        }
    }

    /// Ignores the record for `id`.
    #[must_use]
    pub fn excluding(mut self, id: TrackedId) -> Self {
        self.exclude = Some(id);
        self
    }
}

impl VisibilityStrategy for RegistryObstructions<'_> {
    fn percentage_visible(&self, target: Rect, viewport: Rect) -> f64 {
        let area = target.abs().intersect(viewport.abs());
        let exclude = self.exclude;
        percentage_visible(
            target,
            viewport,
            self.registry
                .query_intersecting(self.place, area)
                .filter(|r| Some(r.id) != exclude),
        )
    }
}

/// Obstructors discovered by walking a layer subtree.
///
/// Every descendant of `root` (including `root`) with
/// [`LayerFlags::obstructor`](crate::layer::LayerFlags::obstructor) set, not
/// effectively hidden, and with non-zero effective opacity obstructs. Each
/// obstructor shrinks the remaining visible part's height by the fraction of
/// its area it covers, instead of subtracting exact rectangles. Layers that
/// are not attached never obstruct, and a dead `root` yields the clipped
/// fraction alone. The store must have been evaluated.
#[derive(Clone, Copy, Debug)]
pub struct TreeObstructions<'a> {
    /// The evaluated render tree.
    pub store: &'a LayerStore,
    /// Subtree to search.
    pub root: LayerId,
    /// A layer to ignore, typically the target itself.
    pub exclude: Option<LayerId>,
}

impl<'a> TreeObstructions<'a> {
    /// Searches the subtree under `root`.
    #[must_use]
    pub fn new(store: &'a LayerStore, root: LayerId) -> Self {
        Self {
            store,
            root,
            exclude: None,
        }
    }

    /// Ignores `layer`.
    #[must_use]
    pub fn excluding(mut self, layer: LayerId) -> Self {
        self.exclude = Some(layer);
        self
    }
}

impl VisibilityStrategy for TreeObstructions<'_> {
    fn percentage_visible(&self, target: Rect, viewport: Rect) -> f64 {
        let Clipped {
            mut visible,
            target_area,
            ..
        } = match clip_to_viewport(target, viewport) {
            Base::Done(fraction) => return fraction,
            Base::Obstructable(clipped) => clipped,
        };

        let store = self.store;
        // A dead root contributes no obstructors.
        let layers = store
            .is_alive(self.root)
            .then(|| store.descendants(self.root))
            .unwrap_or_default();
        for layer in layers {
            if Some(layer) == self.exclude
                || !store.is_attached(layer)
                || !store.flags(layer).obstructor
                || store.effective_hidden(layer)
                || store.effective_opacity(layer) <= 0.0
            {
                continue;
            }
            let remaining = visible.area();
            if remaining <= 0.0 {
                break;
            }
            let covered = store.world_frame(layer).intersect(visible).area();
            if covered <= 0.0 {
                continue;
            }
            let ratio = (covered / remaining).clamp(0.0, 1.0);
            visible.y0 += visible.height() * ratio;
        }

        round_fraction((visible.area() / target_area).clamp(0.0, 1.0))
    }
}
