// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed, cancellable, single-shot deadlines.
//!
//! [`DeadlineQueue`] is the delayed-execution primitive behind observer
//! debouncing and impression timers. It never runs anything itself: the owner
//! calls [`expire`](DeadlineQueue::expire) with the current time and performs
//! the deferred work for each returned key. Each key has at most one pending
//! deadline; scheduling again replaces it.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::time::HostTime;

/// A set of pending deadlines, at most one per key.
#[derive(Clone, Debug)]
pub struct DeadlineQueue<K> {
    pending: BTreeMap<K, HostTime>,
}

impl<K: Ord + Copy> Default for DeadlineQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Copy> DeadlineQueue<K> {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    /// Schedules `key` to fire at `at`, replacing any pending deadline for it.
    ///
    /// Returns the deadline that was replaced, if any.
    pub fn schedule(&mut self, key: K, at: HostTime) -> Option<HostTime> {
        self.pending.insert(key, at)
    }

    /// Cancels the pending deadline for `key`.
    ///
    /// Returns `false` if nothing was pending; cancelling twice is harmless.
    pub fn cancel(&mut self, key: K) -> bool {
        self.pending.remove(&key).is_some()
    }

    /// Returns whether `key` has a pending deadline.
    #[must_use]
    pub fn is_pending(&self, key: K) -> bool {
        self.pending.contains_key(&key)
    }

    /// Returns the pending deadline for `key`.
    #[must_use]
    pub fn deadline(&self, key: K) -> Option<HostTime> {
        self.pending.get(&key).copied()
    }

    /// Returns the earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        self.pending.values().min().copied()
    }

    /// Removes and returns every key whose deadline is at or before `now`,
    /// ordered by deadline, then key.
    pub fn expire(&mut self, now: HostTime) -> Vec<K> {
        let mut due: Vec<(HostTime, K)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, at)| (*at, *k))
            .collect();
        due.sort_unstable();
        for (_, key) in &due {
            self.pending.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Cancels everything.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Returns the number of pending deadlines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn reschedule_replaces() {
        let mut q = DeadlineQueue::new();
        assert_eq!(q.schedule(1_u32, HostTime(100)), None);
        assert_eq!(q.schedule(1, HostTime(250)), Some(HostTime(100)));
        assert_eq!(q.len(), 1);

        assert!(q.expire(HostTime(200)).is_empty(), "old deadline must not fire");
        assert_eq!(q.expire(HostTime(250)), vec![1]);
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut q = DeadlineQueue::new();
        q.schedule(7_u32, HostTime(10));
        assert!(q.cancel(7));
        assert!(!q.cancel(7));
        assert!(q.expire(HostTime(1_000)).is_empty());
    }

    #[test]
    fn expire_orders_by_deadline_then_key() {
        let mut q = DeadlineQueue::new();
        q.schedule(3_u32, HostTime(20));
        q.schedule(1, HostTime(30));
        q.schedule(2, HostTime(20));
        q.schedule(9, HostTime(99));
        assert_eq!(q.next_deadline(), Some(HostTime(20)));
        assert_eq!(q.expire(HostTime(30)), vec![2, 3, 1]);
        assert_eq!(q.deadline(9), Some(HostTime(99)));
    }
}
