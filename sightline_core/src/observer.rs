// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Debounced frame/visibility observers.
//!
//! A [`FrameObserver`] watches one layer and keeps its
//! [`ObstructionRegistry`] record in step with the layer's global frame and
//! own visibility. [`ObserverSet`] drives many observers from the
//! [`FrameChanges`] that [`LayerStore::evaluate`] produces:
//!
//! ```text
//!   evaluate() ──► FrameChanges ──► handle_changes() ──► DeadlineQueue
//!                                                            │ debounce
//!                                   registry ◄── recompute ◄─┘ poll(now)
//! ```
//!
//! A burst of signals for the same element inside one debounce window
//! coalesces into a single recomputation, and a recomputation that finds the
//! same `(frame, visible)` pair as last time writes nothing.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::deadline::DeadlineQueue;
use crate::layer::{FrameChanges, LayerId, LayerStore};
use crate::registry::{ObstructionRegistry, Place, TrackedId};
use crate::time::{Duration, HostTime};
use crate::trace::{ObserverStoppedEvent, RecomputeEvent, StopReason, Tracer};

/// Observer tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverConfig {
    /// Delay between the last signal and the recomputation it triggers.
    pub debounce: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(16),
        }
    }
}

/// What a single recomputation did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RecomputeOutcome {
    /// The record was inserted or replaced.
    Registered {
        /// The layer's frame in global coordinates.
        frame: Rect,
        /// Whether the layer is itself visible.
        visible: bool,
    },
    /// Frame and visibility matched the cached pair; nothing was written.
    Unchanged,
    /// The layer's bounds have zero area; it has not been laid out yet.
    NotLaidOut,
    /// The layer is not attached to the render surface; its record was
    /// removed if present.
    Detached,
}

/// Tracks one layer's frame and visibility in the registry.
#[derive(Clone, Debug)]
pub struct FrameObserver {
    id: TrackedId,
    layer: LayerId,
    place: Place,
    cached: Option<(Rect, bool)>,
}

impl FrameObserver {
    /// Creates an observer for `layer`. Nothing is registered until the
    /// first [`recompute`](Self::recompute).
    #[must_use]
    pub fn new(id: TrackedId, layer: LayerId, place: Place) -> Self {
        Self {
            id,
            layer,
            place,
            cached: None,
        }
    }

    /// The registry id this observer writes under.
    #[must_use]
    pub fn id(&self) -> TrackedId {
        self.id
    }

    /// The observed layer.
    #[must_use]
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// The place the layer obstructs.
    #[must_use]
    pub fn place(&self) -> Place {
        self.place
    }

    /// The last `(frame, visible)` pair written to the registry.
    #[must_use]
    pub fn cached(&self) -> Option<(Rect, bool)> {
        self.cached
    }

    /// Reads the layer's current geometry and updates the registry if it
    /// changed.
    ///
    /// A dead layer handle counts as detached.
    pub fn recompute(
        &mut self,
        store: &LayerStore,
        registry: &mut ObstructionRegistry,
    ) -> RecomputeOutcome {
        if !store.is_attached(self.layer) {
            registry.unregister(self.id);
            self.cached = None;
            return RecomputeOutcome::Detached;
        }
        if store.bounds(self.layer).is_zero_area() {
            return RecomputeOutcome::NotLaidOut;
        }

        let frame = store.world_frame(self.layer);
        let visible =
            !store.effective_hidden(self.layer) && store.effective_opacity(self.layer) > 0.0;
        if self.cached == Some((frame, visible)) {
            return RecomputeOutcome::Unchanged;
        }

        self.cached = Some((frame, visible));
        registry.register_or_update(self.id, frame, self.place, visible);
        RecomputeOutcome::Registered { frame, visible }
    }

    /// Drops the cached pair and removes the record.
    ///
    /// Returns whether a record was removed; calling it again is harmless.
    pub fn stop(&mut self, registry: &mut ObstructionRegistry) -> bool {
        self.cached = None;
        registry.unregister(self.id)
    }
}

/// A set of frame observers sharing one debounce queue.
#[derive(Debug, Default)]
pub struct ObserverSet {
    observers: BTreeMap<TrackedId, FrameObserver>,
    pending: DeadlineQueue<TrackedId>,
    config: ObserverConfig,
}

impl ObserverSet {
    /// Creates an empty set with the given configuration.
    #[must_use]
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            observers: BTreeMap::new(),
            pending: DeadlineQueue::new(),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> ObserverConfig {
        self.config
    }

    /// Starts observing `layer` under `place`.
    ///
    /// Mints a registry id and schedules the first recomputation one debounce
    /// interval from `now`.
    pub fn observe(
        &mut self,
        layer: LayerId,
        place: Place,
        now: HostTime,
        registry: &mut ObstructionRegistry,
    ) -> TrackedId {
        let id = registry.mint_id();
        self.observers.insert(id, FrameObserver::new(id, layer, place));
        self.pending.schedule(id, now + self.config.debounce);
        id
    }

    /// Signals that `id`'s geometry may have changed, replacing any pending
    /// recomputation.
    ///
    /// Returns `false` if `id` is not observed.
    pub fn signal(&mut self, id: TrackedId, now: HostTime) -> bool {
        if !self.observers.contains_key(&id) {
            return false;
        }
        self.pending.schedule(id, now + self.config.debounce);
        true
    }

    /// Routes one evaluation's changes to the affected observers.
    ///
    /// Observers whose layer was destroyed are stopped immediately; the rest
    /// are signalled when their layer appears in `changes`.
    pub fn handle_changes(
        &mut self,
        changes: &FrameChanges,
        store: &LayerStore,
        now: HostTime,
        registry: &mut ObstructionRegistry,
        tracer: &mut Tracer<'_>,
    ) {
        let dead: Vec<TrackedId> = self
            .observers
            .values()
            .filter(|o| !store.is_alive(o.layer))
            .map(|o| o.id)
            .collect();
        for id in dead {
            self.stop_with(id, now, registry, tracer, StopReason::LayerDead);
        }

        if changes.is_empty() {
            return;
        }
        let deadline = now + self.config.debounce;
        for o in self.observers.values() {
            if changes.touches(o.layer.index()) {
                self.pending.schedule(o.id, deadline);
            }
        }
    }

    /// Runs every recomputation whose debounce interval has elapsed.
    ///
    /// Returns the number of recomputations performed.
    pub fn poll(
        &mut self,
        now: HostTime,
        store: &LayerStore,
        registry: &mut ObstructionRegistry,
        tracer: &mut Tracer<'_>,
    ) -> usize {
        let mut ran = 0;
        for id in self.pending.expire(now) {
            let Some(observer) = self.observers.get_mut(&id) else {
                continue;
            };
            if !store.is_alive(observer.layer) {
                self.stop_with(id, now, registry, tracer, StopReason::LayerDead);
                continue;
            }
            let outcome = observer.recompute(store, registry);
            tracer.recompute(&RecomputeEvent {
                id,
                place: observer.place,
                now,
                outcome,
            });
            ran += 1;
        }
        ran
    }

    /// Stops observing `id`: cancels its pending recomputation and removes
    /// its record.
    ///
    /// Returns `false` if `id` was not observed; stopping twice is harmless.
    pub fn stop(
        &mut self,
        id: TrackedId,
        now: HostTime,
        registry: &mut ObstructionRegistry,
        tracer: &mut Tracer<'_>,
    ) -> bool {
        self.stop_with(id, now, registry, tracer, StopReason::Explicit)
    }

    /// Stops every observer.
    pub fn stop_all(
        &mut self,
        now: HostTime,
        registry: &mut ObstructionRegistry,
        tracer: &mut Tracer<'_>,
    ) {
        let ids: Vec<TrackedId> = self.observers.keys().copied().collect();
        for id in ids {
            self.stop_with(id, now, registry, tracer, StopReason::Explicit);
        }
    }

    /// Returns the observer for `id`.
    #[must_use]
    pub fn get(&self, id: TrackedId) -> Option<&FrameObserver> {
        self.observers.get(&id)
    }

    /// Returns whether `id` has a pending recomputation.
    #[must_use]
    pub fn is_pending(&self, id: TrackedId) -> bool {
        self.pending.is_pending(id)
    }

    /// Returns the earliest pending recomputation time.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        self.pending.next_deadline()
    }

    /// Returns the number of live observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns whether no observers are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn stop_with(
        &mut self,
        id: TrackedId,
        now: HostTime,
        registry: &mut ObstructionRegistry,
        tracer: &mut Tracer<'_>,
        reason: StopReason,
    ) -> bool {
        self.pending.cancel(id);
        let Some(mut observer) = self.observers.remove(&id) else {
            return false;
        };
        observer.stop(registry);
        tracer.observer_stopped(&ObserverStoppedEvent { id, now, reason });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerFlags;
    use crate::transform::Transform3d;

    const FEED: Place = Place(0);

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    /// A mounted root with one 100x50 child at (0, 20).
    fn scene() -> (LayerStore, LayerId, LayerId) {
        let mut store = LayerStore::new();
        let root = store.create_layer();
        let child = store.create_layer();
        store.add_child(root, child);
        store.set_bounds(child, Rect::new(0.0, 0.0, 100.0, 50.0));
        store.set_transform(child, Transform3d::from_translation(0.0, 20.0, 0.0));
        store.mount(root);
        let _ = store.evaluate();
        (store, root, child)
    }

    #[test]
    fn first_recompute_registers_after_debounce() {
        let (store, _, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut set = ObserverSet::default();
        let mut tracer = Tracer::none();

        let id = set.observe(child, FEED, ms(0), &mut registry);
        assert_eq!(set.poll(ms(15), &store, &mut registry, &mut tracer), 0);
        assert!(!registry.contains(id));

        assert_eq!(set.poll(ms(16), &store, &mut registry, &mut tracer), 1);
        let record = registry.get(id).copied().unwrap();
        assert_eq!(record.frame, Rect::new(0.0, 20.0, 100.0, 70.0));
        assert!(record.is_visible);
        assert_eq!(record.place, FEED);
    }

    #[test]
    fn burst_of_signals_coalesces_into_one_write() {
        let (mut store, root, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut set = ObserverSet::default();
        let mut tracer = Tracer::none();

        let id = set.observe(child, FEED, ms(0), &mut registry);
        set.poll(ms(16), &store, &mut registry, &mut tracer);
        let before = registry.revision();

        for step in 0..5_u64 {
            let now = ms(100 + step * 5);
            let y = -10.0 * (step + 1) as f64;
            store.set_transform(root, Transform3d::from_translation(0.0, y, 0.0));
            let changes = store.evaluate();
            set.handle_changes(&changes, &store, now, &mut registry, &mut tracer);
            assert_eq!(set.poll(now, &store, &mut registry, &mut tracer), 0);
        }
        assert!(set.is_pending(id));

        // Last signal at 120 ms.
        assert_eq!(set.poll(ms(135), &store, &mut registry, &mut tracer), 0);
        assert_eq!(set.poll(ms(136), &store, &mut registry, &mut tracer), 1);
        assert_eq!(registry.revision() - before, 1);
        assert_eq!(
            registry.get(id).map(|r| r.frame),
            Some(Rect::new(0.0, -30.0, 100.0, 20.0))
        );
    }

    #[test]
    fn unchanged_geometry_skips_registry_write() {
        let (store, _, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut observer = FrameObserver::new(registry.mint_id(), child, FEED);

        assert!(matches!(
            observer.recompute(&store, &mut registry),
            RecomputeOutcome::Registered { visible: true, .. }
        ));
        let revision = registry.revision();
        assert_eq!(
            observer.recompute(&store, &mut registry),
            RecomputeOutcome::Unchanged
        );
        assert_eq!(registry.revision(), revision);
    }

    #[test]
    fn zero_area_is_not_laid_out() {
        let (mut store, _, child) = scene();
        store.set_bounds(child, Rect::ZERO);
        let _ = store.evaluate();

        let mut registry = ObstructionRegistry::new();
        let mut observer = FrameObserver::new(registry.mint_id(), child, FEED);
        assert_eq!(
            observer.recompute(&store, &mut registry),
            RecomputeOutcome::NotLaidOut
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn hidden_and_transparent_layers_register_as_not_visible() {
        let (mut store, root, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut observer = FrameObserver::new(registry.mint_id(), child, FEED);

        store.set_flags(
            root,
            LayerFlags {
                hidden: true,
                ..LayerFlags::default()
            },
        );
        let _ = store.evaluate();
        assert!(matches!(
            observer.recompute(&store, &mut registry),
            RecomputeOutcome::Registered { visible: false, .. }
        ));

        store.set_flags(root, LayerFlags::default());
        store.set_opacity(child, 0.0);
        let _ = store.evaluate();
        observer.recompute(&store, &mut registry);
        assert_eq!(registry.get(observer.id()).map(|r| r.is_visible), Some(false));
    }

    #[test]
    fn detaching_unregisters_and_reattaching_registers_again() {
        let (mut store, root, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut set = ObserverSet::default();
        let mut tracer = Tracer::none();

        let id = set.observe(child, FEED, ms(0), &mut registry);
        set.poll(ms(16), &store, &mut registry, &mut tracer);
        assert!(registry.contains(id));

        store.unmount(root);
        let changes = store.evaluate();
        set.handle_changes(&changes, &store, ms(50), &mut registry, &mut tracer);
        set.poll(ms(66), &store, &mut registry, &mut tracer);
        assert!(!registry.contains(id));
        assert_eq!(set.get(id).and_then(FrameObserver::cached), None);

        store.mount(root);
        let changes = store.evaluate();
        set.handle_changes(&changes, &store, ms(100), &mut registry, &mut tracer);
        set.poll(ms(116), &store, &mut registry, &mut tracer);
        assert!(registry.contains(id));
    }

    #[test]
    fn destroyed_layer_stops_its_observer() {
        let (mut store, _, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut set = ObserverSet::default();
        let mut tracer = Tracer::none();

        let id = set.observe(child, FEED, ms(0), &mut registry);
        set.poll(ms(16), &store, &mut registry, &mut tracer);

        store.destroy_layer(child);
        let changes = store.evaluate();
        set.handle_changes(&changes, &store, ms(20), &mut registry, &mut tracer);
        assert!(set.get(id).is_none());
        assert!(!registry.contains(id));
        assert_eq!(set.next_deadline(), None);
    }

    #[test]
    fn stop_is_idempotent_and_cancels_pending_work() {
        let (store, _, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut set = ObserverSet::default();
        let mut tracer = Tracer::none();

        let id = set.observe(child, FEED, ms(0), &mut registry);
        assert!(set.stop(id, ms(5), &mut registry, &mut tracer));
        assert!(!set.stop(id, ms(6), &mut registry, &mut tracer));
        assert!(!set.signal(id, ms(7)));
        assert_eq!(set.poll(ms(100), &store, &mut registry, &mut tracer), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn stop_all_clears_every_record() {
        let (store, root, child) = scene();
        let mut registry = ObstructionRegistry::new();
        let mut set = ObserverSet::default();
        let mut tracer = Tracer::none();

        set.observe(child, FEED, ms(0), &mut registry);
        set.observe(root, FEED, ms(0), &mut registry);
        set.poll(ms(16), &store, &mut registry, &mut tracer);
        assert_eq!(registry.len(), 1, "root has zero-area bounds");

        set.stop_all(ms(20), &mut registry, &mut tracer);
        assert!(set.is_empty());
        assert!(registry.is_empty());
    }
}
