// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Obstruction registry.
//!
//! [`ObstructionRegistry`] maps each tracked element to its latest
//! global-space frame, [`Place`], and own visibility. Frame observers write
//! into it; visibility calculations read from it. A record's presence means
//! the element currently counts as an obstructor; absence means it does not.
//!
//! The registry is an ordinary value rather than a process-wide singleton, so
//! independent registries (one per render surface, one per test) can coexist.
//! Mutation requires `&mut`, which confines writes to whichever context owns
//! the registry. Subscribers only ever see `&ObstructionRegistry`.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

/// Opaque identity of a tracked element.
///
/// Minted by [`ObstructionRegistry::mint_id`]; stable for as long as the
/// element is tracked.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackedId(u64);

impl TrackedId {
    /// Returns the raw id value (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Rebuilds an id from a raw value, e.g. when decoding a trace.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for TrackedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackedId({})", self.0)
    }
}

/// A logical zone or catalog that scopes which obstructors apply.
///
/// Hosts assign place values; the registry treats them as opaque tags.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Place(pub u32);

impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Place({})", self.0)
    }
}

/// The registry's view of one tracked element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedElementRecord {
    /// The element's identity.
    pub id: TrackedId,
    /// The zone the element obstructs.
    pub place: Place,
    /// The element's frame in global coordinates.
    pub frame: Rect,
    /// The element's own visibility (not hidden, non-zero opacity),
    /// independent of anything covering it.
    pub is_visible: bool,
}

/// A change notification delivered to subscribers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegistryEvent {
    /// A record was inserted or replaced.
    Updated(TrackedElementRecord),
    /// A record was removed.
    Removed {
        /// The removed element.
        id: TrackedId,
        /// The place it was registered under.
        place: Place,
    },
    /// Every record was dropped by [`ObstructionRegistry::clear`].
    Cleared,
}

/// Handle returned by [`ObstructionRegistry::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u32);

type Callback = Box<dyn FnMut(&RegistryEvent, &ObstructionRegistry)>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

/// Map from tracked element to its current frame, place, and visibility.
pub struct ObstructionRegistry {
    records: BTreeMap<TrackedId, TrackedElementRecord>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    next_subscription: u32,
    revision: u64,
}

impl fmt::Debug for ObstructionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObstructionRegistry")
            .field("records", &self.records.len())
            .field("subscribers", &self.subscribers.len())
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl Default for ObstructionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObstructionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            subscribers: Vec::new(),
            next_id: 1,
            next_subscription: 0,
            revision: 0,
        }
    }

    /// Mints a fresh element id, unique within this registry.
    pub fn mint_id(&mut self) -> TrackedId {
        let id = TrackedId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Inserts or replaces the record for `id` and notifies subscribers.
    ///
    /// No diffing happens here; callers skip the call when nothing changed.
    pub fn register_or_update(&mut self, id: TrackedId, frame: Rect, place: Place, is_visible: bool) {
        let record = TrackedElementRecord {
            id,
            place,
            frame,
            is_visible,
        };
        self.records.insert(id, record);
        self.notify(&RegistryEvent::Updated(record));
    }

    /// Removes the record for `id`.
    ///
    /// Returns `false`, without notifying anyone, if `id` was not registered.
    /// Overlapping teardown paths may call this repeatedly.
    pub fn unregister(&mut self, id: TrackedId) -> bool {
        let Some(record) = self.records.remove(&id) else {
            return false;
        };
        self.notify(&RegistryEvent::Removed {
            id,
            place: record.place,
        });
        true
    }

    /// Returns the record for `id`, if registered.
    #[must_use]
    pub fn get(&self, id: TrackedId) -> Option<&TrackedElementRecord> {
        self.records.get(&id)
    }

    /// Returns whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: TrackedId) -> bool {
        self.records.contains_key(&id)
    }

    /// Returns all records registered under `place`.
    pub fn query(&self, place: Place) -> impl Iterator<Item = &TrackedElementRecord> + '_ {
        self.records.values().filter(move |r| r.place == place)
    }

    /// Returns the records under `place` whose frame overlaps `area`.
    ///
    /// Touching edges do not count as overlap.
    pub fn query_intersecting(
        &self,
        place: Place,
        area: Rect,
    ) -> impl Iterator<Item = &TrackedElementRecord> + '_ {
        self.query(place)
            .filter(move |r| !r.frame.intersect(area).is_zero_area())
    }

    /// Returns the number of registered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns a counter that increases with every notification.
    ///
    /// Pollers can compare revisions instead of subscribing.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Registers a change callback.
    ///
    /// The callback runs after every mutation with the event and the
    /// registry's committed state. Delivery order across subscribers is
    /// unspecified.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&RegistryEvent, &Self) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes a change callback. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Drops every record and notifies subscribers once.
    ///
    /// Intended for test setup and whole-surface teardown.
    pub fn clear(&mut self) {
        self.records.clear();
        self.notify(&RegistryEvent::Cleared);
    }

    fn notify(&mut self, event: &RegistryEvent) {
        self.revision += 1;
        // Take the list so callbacks can read `self` while they run.
        let mut subscribers = core::mem::take(&mut self.subscribers);
        for s in &mut subscribers {
            (s.callback)(event, self);
        }
        self.subscribers = subscribers;
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::{Cell, RefCell};

    use super::*;

    const FEED: Place = Place(1);
    const HEADER: Place = Place(2);

    #[test]
    fn register_update_and_query() {
        let mut reg = ObstructionRegistry::new();
        let a = reg.mint_id();
        let b = reg.mint_id();
        assert_ne!(a, b);

        reg.register_or_update(a, Rect::new(0.0, 0.0, 10.0, 10.0), FEED, true);
        reg.register_or_update(b, Rect::new(50.0, 50.0, 60.0, 60.0), HEADER, true);
        reg.register_or_update(a, Rect::new(0.0, 0.0, 20.0, 20.0), FEED, false);

        assert_eq!(reg.len(), 2);
        let feed: Vec<_> = reg.query(FEED).collect();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].frame, Rect::new(0.0, 0.0, 20.0, 20.0));
        assert!(!feed[0].is_visible);
    }

    #[test]
    fn query_intersecting_filters_by_overlap() {
        let mut reg = ObstructionRegistry::new();
        let near = reg.mint_id();
        let far = reg.mint_id();
        let touching = reg.mint_id();
        reg.register_or_update(near, Rect::new(0.0, 0.0, 10.0, 10.0), FEED, true);
        reg.register_or_update(far, Rect::new(100.0, 100.0, 110.0, 110.0), FEED, true);
        reg.register_or_update(touching, Rect::new(10.0, 0.0, 20.0, 10.0), FEED, true);

        let hits: Vec<_> = reg
            .query_intersecting(FEED, Rect::new(5.0, 5.0, 10.0, 10.0))
            .map(|r| r.id)
            .collect();
        assert_eq!(hits, vec![near]);
    }

    #[test]
    fn unregister_twice_is_same_as_once() {
        let mut reg = ObstructionRegistry::new();
        let notified = Rc::new(Cell::new(0));
        let n = Rc::clone(&notified);
        reg.subscribe(move |_, _| n.set(n.get() + 1));

        let id = reg.mint_id();
        reg.register_or_update(id, Rect::new(0.0, 0.0, 1.0, 1.0), FEED, true);
        assert!(reg.unregister(id));
        assert!(!reg.unregister(id));

        assert!(!reg.contains(id));
        assert_eq!(notified.get(), 2, "one update plus one removal");
    }

    #[test]
    fn subscribers_see_committed_state() {
        let mut reg = ObstructionRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let other = Rc::new(Cell::new(0));

        let s = Rc::clone(&seen);
        reg.subscribe(move |event, reg| {
            if let RegistryEvent::Updated(record) = event {
                s.borrow_mut().push(reg.get(record.id).copied());
            }
        });
        let o = Rc::clone(&other);
        let second = reg.subscribe(move |_, _| o.set(o.get() + 1));

        let id = reg.mint_id();
        let frame = Rect::new(1.0, 2.0, 3.0, 4.0);
        reg.register_or_update(id, frame, FEED, true);
        assert_eq!(seen.borrow()[0].map(|r| r.frame), Some(frame));
        assert_eq!(other.get(), 1);

        assert!(reg.unsubscribe(second));
        assert!(!reg.unsubscribe(second));
        reg.register_or_update(id, frame, FEED, false);
        assert_eq!(other.get(), 1, "unsubscribed callback must not run");
        assert_eq!(reg.revision(), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let mut reg = ObstructionRegistry::new();
        let id = reg.mint_id();
        reg.register_or_update(id, Rect::new(0.0, 0.0, 1.0, 1.0), FEED, true);
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.query(FEED).count(), 0);
    }
}
