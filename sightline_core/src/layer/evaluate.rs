// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame evaluation and change tracking.
//!
//! Evaluation follows a drain-recompute pattern for each dirty channel:
//!
//! 1. **TRANSFORM** — recompute `world_transform` as
//!    `parent_world * local_transform`, `effective_hidden` as
//!    `parent_hidden || flags.hidden`, and attachment as "parent attached, or
//!    mounted root".
//! 2. **OPACITY** — recompute `effective_opacity` as
//!    `parent_effective * local_opacity`.
//! 3. **BOUNDS** / **CLIP** — collect only; readers use the stored values.
//! 4. **TOPOLOGY** — drain and discard (the traversal order was already
//!    rebuilt at the start of evaluation if needed).
//!
//! [`FrameChanges`] is the signal feed for
//! [`ObserverSet::handle_changes`](crate::observer::ObserverSet::handle_changes):
//! each list names raw slot indices whose frame or visibility may have moved.

use alloc::vec::Vec;

use super::id::INVALID;
use super::store::LayerStore;
use crate::dirty;
use crate::transform::Transform3d;

/// The set of changes produced by a single [`LayerStore::evaluate`] call.
///
/// Each field contains the raw slot indices of layers that changed in the
/// corresponding category.
#[derive(Clone, Debug, Default)]
pub struct FrameChanges {
    /// Layers whose world transform was recomputed.
    pub transforms: Vec<u32>,
    /// Layers whose effective opacity was recomputed.
    pub opacities: Vec<u32>,
    /// Layers whose local bounds changed.
    pub bounds: Vec<u32>,
    /// Layers whose clip shape changed.
    pub clips: Vec<u32>,
    /// Layers that transitioned from visible to effectively hidden.
    pub hidden: Vec<u32>,
    /// Layers that transitioned from effectively hidden to visible.
    pub unhidden: Vec<u32>,
    /// Layers that became attached to the render surface.
    pub attached: Vec<u32>,
    /// Layers that were detached from the render surface.
    pub detached: Vec<u32>,
    /// Layers added since the last evaluate.
    pub added: Vec<u32>,
    /// Layers removed since the last evaluate.
    pub removed: Vec<u32>,
    /// Whether the tree topology changed (traversal order was rebuilt).
    pub topology_changed: bool,
}

impl FrameChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.transforms.clear();
        self.opacities.clear();
        self.bounds.clear();
        self.clips.clear();
        self.hidden.clear();
        self.unhidden.clear();
        self.attached.clear();
        self.detached.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
    }

    /// Returns whether anything that affects the frame or visibility of the
    /// layer at slot `idx` changed.
    #[must_use]
    pub fn touches(&self, idx: u32) -> bool {
        [
            &self.transforms,
            &self.opacities,
            &self.bounds,
            &self.hidden,
            &self.unhidden,
            &self.attached,
            &self.detached,
            &self.removed,
        ]
        .iter()
        .any(|list| list.contains(&idx))
    }

    /// Returns whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.topology_changed
            && self.transforms.is_empty()
            && self.opacities.is_empty()
            && self.bounds.is_empty()
            && self.clips.is_empty()
            && self.hidden.is_empty()
            && self.unhidden.is_empty()
            && self.attached.is_empty()
            && self.detached.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
    }
}

impl LayerStore {
    /// Evaluates the layer tree, recomputing dirty properties and returning
    /// the set of changes.
    pub fn evaluate(&mut self) -> FrameChanges {
        let mut changes = FrameChanges::default();
        self.evaluate_into(&mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided buffer.
    pub fn evaluate_into(&mut self, changes: &mut FrameChanges) {
        changes.clear();

        if self.traversal_dirty {
            self.rebuild_traversal_order();
            changes.topology_changed = true;
            self.traversal_dirty = false;
        }

        let dirty_transforms: Vec<u32> = self
            .dirty
            .drain(dirty::TRANSFORM)
            .affected()
            .deterministic()
            .run()
            .collect();
        for &idx in &dirty_transforms {
            let i = idx as usize;
            let parent_idx = self.parent[i];
            let (parent_world, parent_hidden, parent_attached) = if parent_idx != INVALID {
                let p = parent_idx as usize;
                (
                    self.world_transform[p],
                    self.effective_hidden[p],
                    self.attached[p],
                )
            } else {
                (Transform3d::IDENTITY, false, self.mounted[i])
            };
            self.world_transform[i] = parent_world * self.local_transform[i];

            let new_hidden = parent_hidden || self.flags[i].hidden;
            if new_hidden != self.effective_hidden[i] {
                if new_hidden {
                    changes.hidden.push(idx);
                } else {
                    changes.unhidden.push(idx);
                }
                self.effective_hidden[i] = new_hidden;
            }

            if parent_attached != self.attached[i] {
                if parent_attached {
                    changes.attached.push(idx);
                } else {
                    changes.detached.push(idx);
                }
                self.attached[i] = parent_attached;
            }
        }
        changes.transforms = dirty_transforms;

        let dirty_opacities: Vec<u32> = self
            .dirty
            .drain(dirty::OPACITY)
            .affected()
            .deterministic()
            .run()
            .collect();
        for &idx in &dirty_opacities {
            let parent_opacity = if self.parent[idx as usize] != INVALID {
                self.effective_opacity[self.parent[idx as usize] as usize]
            } else {
                1.0
            };
            self.effective_opacity[idx as usize] =
                parent_opacity * self.local_opacity[idx as usize];
        }
        changes.opacities = dirty_opacities;

        changes.bounds = self
            .dirty
            .drain(dirty::BOUNDS)
            .deterministic()
            .run()
            .collect();

        changes.clips = self
            .dirty
            .drain(dirty::CLIP)
            .deterministic()
            .run()
            .collect();

        let _: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
    }

    /// Returns the current traversal order (depth-first pre-order).
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called at least
    /// once.
    #[must_use]
    pub fn traversal_order(&self) -> &[u32] {
        &self.traversal_order
    }

    fn rebuild_traversal_order(&mut self) {
        self.traversal_order.clear();
        for idx in 0..self.len {
            if self.parent[idx as usize] == INVALID && !self.free_list.contains(&idx) {
                self.dfs_collect(idx);
            }
        }
    }

    fn dfs_collect(&mut self, idx: u32) {
        self.traversal_order.push(idx);
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.dfs_collect(child);
            child = self.next_sibling[child as usize];
        }
    }
}
