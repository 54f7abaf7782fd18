// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays layer storage with allocation, topology, and property management.

use alloc::vec::Vec;

use kurbo::Rect;
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use crate::dirty;
use crate::transform::Transform3d;

use super::clip::ClipShape;
use super::id::{INVALID, LayerId};
use super::traverse::Children;

/// Per-layer boolean flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayerFlags {
    /// Whether the layer (and its subtree) is hidden.
    pub hidden: bool,
    /// Whether the layer covers content painted beneath it.
    ///
    /// Only consulted by the registry-free
    /// [`TreeObstructions`](crate::visibility::TreeObstructions) strategy.
    pub obstructor: bool,
}

/// Struct-of-arrays storage for all layers of a render tree.
///
/// Layers are addressed by [`LayerId`] handles. Destroyed layers are
/// recycled via a free list, and generation counters make stale handles
/// detectable with [`is_alive`](Self::is_alive).
#[derive(Debug)]
pub struct LayerStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Local properties (set by callers) --
    pub(crate) local_transform: Vec<Transform3d>,
    pub(crate) local_opacity: Vec<f32>,
    pub(crate) bounds: Vec<Rect>,
    pub(crate) clip: Vec<Option<ClipShape>>,
    pub(crate) flags: Vec<LayerFlags>,
    pub(crate) mounted: Vec<bool>,

    // -- Computed properties (written by evaluate) --
    pub(crate) world_transform: Vec<Transform3d>,
    pub(crate) effective_opacity: Vec<f32>,
    pub(crate) effective_hidden: Vec<bool>,
    pub(crate) attached: Vec<bool>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Traversal cache --
    pub(crate) traversal_order: Vec<u32>,
    pub(crate) traversal_dirty: bool,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    /// Creates an empty layer store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            local_transform: Vec::new(),
            local_opacity: Vec::new(),
            bounds: Vec::new(),
            clip: Vec::new(),
            flags: Vec::new(),
            mounted: Vec::new(),
            world_transform: Vec::new(),
            effective_opacity: Vec::new(),
            effective_hidden: Vec::new(),
            attached: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            traversal_order: Vec::new(),
            traversal_dirty: true,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Creates a new layer and returns its handle.
    ///
    /// The layer starts with an identity transform, full opacity, empty
    /// bounds, no clip, no parent, and is not mounted.
    pub fn create_layer(&mut self) -> LayerId {
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot.
            let i = idx as usize;
            self.generation[i] += 1;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.local_transform[i] = Transform3d::IDENTITY;
            self.local_opacity[i] = 1.0;
            self.bounds[i] = Rect::ZERO;
            self.clip[i] = None;
            self.flags[i] = LayerFlags::default();
            self.mounted[i] = false;
            self.world_transform[i] = Transform3d::IDENTITY;
            self.effective_opacity[i] = 1.0;
            self.effective_hidden[i] = false;
            self.attached[i] = false;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.local_transform.push(Transform3d::IDENTITY);
            self.local_opacity.push(1.0);
            self.bounds.push(Rect::ZERO);
            self.clip.push(None);
            self.flags.push(LayerFlags::default());
            self.mounted.push(false);
            self.world_transform.push(Transform3d::IDENTITY);
            self.effective_opacity.push(1.0);
            self.effective_hidden.push(false);
            self.attached.push(false);
            self.generation.push(0);
            idx
        };

        self.traversal_dirty = true;
        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);

        self.handle_at(idx)
    }

    /// Destroys a layer, freeing its slot for reuse.
    ///
    /// # Panics
    ///
    /// Panics if the layer has children (remove them first) or if the handle
    /// is stale.
    pub fn destroy_layer(&mut self, id: LayerId) {
        self.validate(id);
        let idx = id.idx;
        assert!(
            self.first_child[idx as usize] == INVALID,
            "cannot destroy layer with children"
        );

        if self.parent[idx as usize] != INVALID {
            self.unlink_from_parent(idx);
        }
        self.dirty.remove_key(idx);

        // Bump generation so old handles immediately fail validation.
        self.generation[idx as usize] += 1;
        self.mounted[idx as usize] = false;
        self.attached[idx as usize] = false;

        self.free_list.push(idx);
        self.traversal_dirty = true;
        self.pending_removed.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
    }

    /// Returns whether the given handle refers to a live layer.
    #[must_use]
    pub fn is_alive(&self, id: LayerId) -> bool {
        (id.idx < self.len)
            && self.generation[id.idx as usize] == id.generation
            && !self.free_list.contains(&id.idx)
    }

    // -- Topology API --

    /// Adds `child` as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, or if `child` already has a parent.
    pub fn add_child(&mut self, parent: LayerId, child: LayerId) {
        self.validate(parent);
        self.validate(child);
        assert!(
            self.parent[child.idx as usize] == INVALID,
            "child already has a parent"
        );
        self.link_child(parent.idx, child.idx);
    }

    /// Removes `child` from its current parent.
    ///
    /// The detached subtree is no longer attached to the render surface,
    /// even if its old root was mounted.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the layer has no parent.
    pub fn remove_from_parent(&mut self, child: LayerId) {
        self.validate(child);
        let c = child.idx;
        assert!(self.parent[c as usize] != INVALID, "layer has no parent");

        let p = self.parent[c as usize];
        self.unlink_from_parent(c);
        self.dirty.remove_dependency(c, p, dirty::TRANSFORM);
        self.dirty.remove_dependency(c, p, dirty::OPACITY);

        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Moves `child` to be the last child of `new_parent`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale.
    pub fn reparent(&mut self, child: LayerId, new_parent: LayerId) {
        self.validate(child);
        self.validate(new_parent);
        if self.parent[child.idx as usize] != INVALID {
            self.remove_from_parent(child);
        }
        self.link_child(new_parent.idx, child.idx);
    }

    /// Mounts a root layer on the render surface.
    ///
    /// Every layer in the root's subtree becomes *attached* at the next
    /// [`evaluate`](Self::evaluate).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the layer has a parent.
    pub fn mount(&mut self, root: LayerId) {
        self.set_mounted(root, true);
    }

    /// Unmounts a root layer, detaching its whole subtree at the next
    /// [`evaluate`](Self::evaluate).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the layer has a parent.
    pub fn unmount(&mut self, root: LayerId) {
        self.set_mounted(root, false);
    }

    /// Returns the parent of a layer, if any.
    #[must_use]
    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        (p != INVALID).then(|| self.handle_at(p))
    }

    /// Returns an iterator over the direct children of a layer.
    #[must_use]
    pub fn children(&self, id: LayerId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns the live root layers (those with no parent).
    #[must_use]
    pub fn roots(&self) -> Vec<LayerId> {
        (0..self.len)
            .filter(|&idx| self.parent[idx as usize] == INVALID && !self.free_list.contains(&idx))
            .map(|idx| self.handle_at(idx))
            .collect()
    }

    // -- Property getters (read-only, no dirty marking) --

    /// Returns the local transform of a layer.
    #[must_use]
    pub fn local_transform(&self, id: LayerId) -> Transform3d {
        self.validate(id);
        self.local_transform[id.idx as usize]
    }

    /// Returns the local opacity of a layer.
    #[must_use]
    pub fn local_opacity(&self, id: LayerId) -> f32 {
        self.validate(id);
        self.local_opacity[id.idx as usize]
    }

    /// Returns the local bounds of a layer.
    #[must_use]
    pub fn bounds(&self, id: LayerId) -> Rect {
        self.validate(id);
        self.bounds[id.idx as usize]
    }

    /// Returns the clip shape of a layer.
    #[must_use]
    pub fn clip(&self, id: LayerId) -> Option<ClipShape> {
        self.validate(id);
        self.clip[id.idx as usize]
    }

    /// Returns the flags of a layer.
    #[must_use]
    pub fn flags(&self, id: LayerId) -> LayerFlags {
        self.validate(id);
        self.flags[id.idx as usize]
    }

    /// Returns the computed world transform of a layer.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn world_transform(&self, id: LayerId) -> Transform3d {
        self.validate(id);
        self.world_transform[id.idx as usize]
    }

    /// Returns the computed effective opacity of a layer.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn effective_opacity(&self, id: LayerId) -> f32 {
        self.validate(id);
        self.effective_opacity[id.idx as usize]
    }

    /// Returns whether the layer is effectively hidden (including by an
    /// ancestor's hidden flag).
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn effective_hidden(&self, id: LayerId) -> bool {
        self.validate(id);
        self.effective_hidden[id.idx as usize]
    }

    /// Returns whether the layer is attached to the render surface, i.e. its
    /// root is mounted.
    ///
    /// Dead handles report `false`. Only valid after
    /// [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn is_attached(&self, id: LayerId) -> bool {
        self.is_alive(id) && self.attached[id.idx as usize]
    }

    /// Returns the layer's bounds mapped into the global coordinate space.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn world_frame(&self, id: LayerId) -> Rect {
        self.validate(id);
        let i = id.idx as usize;
        self.world_transform[i].map_rect(self.bounds[i])
    }

    /// Returns the intersection of the world-space clips of the layer and all
    /// of its ancestors, or `None` if nothing on the path clips.
    ///
    /// For a scroll container this is the visible window its content is
    /// measured against. Only valid after [`evaluate`](Self::evaluate) has
    /// been called.
    #[must_use]
    pub fn world_clip(&self, id: LayerId) -> Option<Rect> {
        self.validate(id);
        let mut out: Option<Rect> = None;
        let mut idx = id.idx;
        while idx != INVALID {
            let i = idx as usize;
            if let Some(clip) = self.clip[i] {
                let rect = self.world_transform[i].map_rect(clip.bounding_rect());
                out = Some(out.map_or(rect, |acc| acc.intersect(rect)));
            }
            idx = self.parent[i];
        }
        out
    }

    // -- Mutation API (auto-marks dirty) --

    /// Sets the local transform of a layer.
    ///
    /// Marks the TRANSFORM channel dirty with eager propagation to descendants.
    pub fn set_transform(&mut self, id: LayerId, transform: Transform3d) {
        self.validate(id);
        self.local_transform[id.idx as usize] = transform;
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    /// Sets the local opacity of a layer.
    ///
    /// Marks the OPACITY channel dirty with eager propagation to descendants.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) {
        self.validate(id);
        self.local_opacity[id.idx as usize] = opacity;
        self.dirty.mark_with(id.idx, dirty::OPACITY, &EagerPolicy);
    }

    /// Sets the local bounds of a layer.
    pub fn set_bounds(&mut self, id: LayerId, bounds: Rect) {
        self.validate(id);
        self.bounds[id.idx as usize] = bounds;
        self.dirty.mark(id.idx, dirty::BOUNDS);
    }

    /// Sets the clip shape of a layer.
    pub fn set_clip(&mut self, id: LayerId, clip: Option<ClipShape>) {
        self.validate(id);
        self.clip[id.idx as usize] = clip;
        self.dirty.mark(id.idx, dirty::CLIP);
    }

    /// Sets the flags of a layer.
    pub fn set_flags(&mut self, id: LayerId, flags: LayerFlags) {
        self.validate(id);
        self.flags[id.idx as usize] = flags;
        // The hidden flag is inherited, so it rides on TRANSFORM.
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    // -- Internal helpers --

    /// Builds a handle for a live slot.
    pub(crate) fn handle_at(&self, idx: u32) -> LayerId {
        LayerId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Panics if the handle is stale.
    fn validate(&self, id: LayerId) {
        assert!(
            id.idx < self.len && self.generation[id.idx as usize] == id.generation,
            "stale LayerId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    fn set_mounted(&mut self, root: LayerId, mounted: bool) {
        self.validate(root);
        assert!(
            self.parent[root.idx as usize] == INVALID,
            "only root layers can be mounted"
        );
        if self.mounted[root.idx as usize] != mounted {
            self.mounted[root.idx as usize] = mounted;
            self.dirty.mark_with(root.idx, dirty::TRANSFORM, &EagerPolicy);
        }
    }

    /// Appends `c` to `p`'s child list and wires up dirty dependencies.
    fn link_child(&mut self, p: u32, c: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }

        // A child layer is positioned by its parent, so it can no longer be
        // a mounted root itself.
        self.mounted[c as usize] = false;

        let _ = self.dirty.add_dependency(c, p, dirty::TRANSFORM);
        let _ = self.dirty.add_dependency(c, p, dirty::OPACITY);

        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Removes `idx` from its parent's child list without touching dirty state.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    /// Marks the subtree rooted at `idx` dirty for inherited channels.
    fn mark_subtree_inherited_dirty(&mut self, idx: u32) {
        self.dirty.mark_with(idx, dirty::TRANSFORM, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::OPACITY, &EagerPolicy);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn generation_prevents_stale_access() {
        let mut store = LayerStore::new();
        let id1 = store.create_layer();
        store.destroy_layer(id1);
        let id2 = store.create_layer();
        assert!(!store.is_alive(id1));
        assert!(store.is_alive(id2));
        assert_eq!(id1.idx, id2.idx);
        assert_ne!(id1.generation, id2.generation);
    }

    #[test]
    fn add_remove_and_reparent() {
        let mut store = LayerStore::new();
        let p1 = store.create_layer();
        let p2 = store.create_layer();
        let a = store.create_layer();
        let b = store.create_layer();

        store.add_child(p1, a);
        store.add_child(p1, b);
        assert_eq!(store.children(p1).collect::<Vec<_>>(), vec![a, b]);

        store.reparent(a, p2);
        assert_eq!(store.parent(a), Some(p2));
        assert_eq!(store.children(p1).collect::<Vec<_>>(), vec![b]);

        store.remove_from_parent(b);
        assert_eq!(store.parent(b), None);
        assert!(store.children(p1).next().is_none());
    }

    #[test]
    fn descendants_are_pre_order() {
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        let c = store.create_layer();
        let d = store.create_layer();
        // a -> [b -> [d], c]
        store.add_child(a, b);
        store.add_child(a, c);
        store.add_child(b, d);
        assert_eq!(store.descendants(a), vec![a, b, d, c]);
    }

    #[test]
    fn roots_returns_parentless_layers() {
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        let c = store.create_layer();
        store.add_child(a, c);

        let roots = store.roots();
        assert!(roots.contains(&a));
        assert!(roots.contains(&b));
        assert!(!roots.contains(&c));
    }

    #[test]
    fn world_frame_follows_ancestor_transforms() {
        let mut store = LayerStore::new();
        let root = store.create_layer();
        let child = store.create_layer();
        store.add_child(root, child);
        store.set_transform(root, Transform3d::from_translation(0.0, -100.0, 0.0));
        store.set_transform(child, Transform3d::from_translation(10.0, 150.0, 0.0));
        store.set_bounds(child, Rect::new(0.0, 0.0, 50.0, 20.0));
        let _ = store.evaluate();

        assert_eq!(store.world_frame(child), Rect::new(10.0, 50.0, 60.0, 70.0));
    }

    #[test]
    fn world_clip_intersects_ancestor_clips() {
        let mut store = LayerStore::new();
        let window = store.create_layer();
        let scroller = store.create_layer();
        store.add_child(window, scroller);
        store.set_clip(window, Some(ClipShape::Rect(Rect::new(0.0, 0.0, 320.0, 480.0))));
        store.set_transform(scroller, Transform3d::from_translation(0.0, 400.0, 0.0));
        store.set_clip(scroller, Some(ClipShape::Rect(Rect::new(0.0, 0.0, 320.0, 200.0))));
        let _ = store.evaluate();

        assert_eq!(store.world_clip(scroller), Some(Rect::new(0.0, 400.0, 320.0, 480.0)));
        assert_eq!(store.world_clip(window), Some(Rect::new(0.0, 0.0, 320.0, 480.0)));

        let loose = store.create_layer();
        let _ = store.evaluate();
        assert_eq!(store.world_clip(loose), None);
    }

    #[test]
    #[should_panic(expected = "cannot destroy layer with children")]
    fn destroy_with_children_panics() {
        let mut store = LayerStore::new();
        let parent = store.create_layer();
        let child = store.create_layer();
        store.add_child(parent, child);
        store.destroy_layer(parent);
    }

    #[test]
    #[should_panic(expected = "stale LayerId")]
    fn destroyed_handle_panics_on_set_bounds() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.destroy_layer(id);
        store.set_bounds(id, Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    #[should_panic(expected = "only root layers can be mounted")]
    fn mounting_a_child_panics() {
        let mut store = LayerStore::new();
        let parent = store.create_layer();
        let child = store.create_layer();
        store.add_child(parent, child);
        store.mount(child);
    }

    #[test]
    fn dead_handle_is_not_attached() {
        let mut store = LayerStore::new();
        let root = store.create_layer();
        store.mount(root);
        let _ = store.evaluate();
        assert!(store.is_attached(root));

        store.destroy_layer(root);
        assert!(!store.is_attached(root));
    }
}
