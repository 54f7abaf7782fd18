// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlay ("presented on top") detection.
//!
//! Hosts usually cannot be notified when a modal or sheet covers a context,
//! so [`PresentationDetector`] samples an [`OverlayQuery`] at a bounded rate
//! (15 Hz by default) and turns the samples into an edge-triggered
//! *dismissed* signal: callbacks run only on a covered-to-uncovered
//! transition.
//!
//! The detector also implements [`OverlayProbe`], answering with its latest
//! sample, so it can gate an
//! [`ImpressionTracker`](crate::impression::ImpressionTracker) directly.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::impression::{ItemId, OverlayProbe};
use crate::layer::{LayerId, LayerStore};
use crate::time::{Duration, HostTime};
use crate::trace::{OverlayPollEvent, Tracer};

/// The host's "is an overlay covering this context right now" check.
pub trait OverlayQuery {
    /// Returns whether an overlay currently covers the context.
    fn is_covered(&mut self) -> bool;
}

impl<F: FnMut() -> bool> OverlayQuery for F {
    fn is_covered(&mut self) -> bool {
        self()
    }
}

/// Polling configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentationConfig {
    /// Minimum time between two samples.
    pub poll_interval: Duration,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_nanos(1_000_000_000 / 15),
        }
    }
}

/// Result of [`PresentationDetector::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Stopped, or the next tick is not due yet.
    Idle,
    /// A sample was taken without a dismissal.
    Sampled {
        /// Whether the context is covered.
        covered: bool,
    },
    /// A sample found the overlay gone; dismissal callbacks ran.
    Dismissed,
}

/// Edge-triggered overlay dismissal detector for one context.
pub struct PresentationDetector {
    config: PresentationConfig,
    next_tick: Option<HostTime>,
    covered: bool,
    on_dismissed: Vec<Box<dyn FnMut(HostTime)>>,
}

impl fmt::Debug for PresentationDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationDetector")
            .field("config", &self.config)
            .field("next_tick", &self.next_tick)
            .field("covered", &self.covered)
            .field("on_dismissed", &self.on_dismissed.len())
            .finish()
    }
}

impl Default for PresentationDetector {
    fn default() -> Self {
        Self::new(PresentationConfig::default())
    }
}

impl PresentationDetector {
    /// Creates a stopped detector.
    #[must_use]
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            config,
            next_tick: None,
            covered: false,
            on_dismissed: Vec::new(),
        }
    }

    /// Registers a callback for covered-to-uncovered transitions.
    ///
    /// The callback receives the time of the sample that saw the overlay
    /// gone.
    pub fn on_dismissed(&mut self, callback: impl FnMut(HostTime) + 'static) {
        self.on_dismissed.push(Box::new(callback));
    }

    /// Starts polling; the first sample is due at `now`.
    ///
    /// Returns `false` if already running.
    pub fn start(&mut self, now: HostTime) -> bool {
        if self.next_tick.is_some() {
            return false;
        }
        self.covered = false;
        self.next_tick = Some(now);
        true
    }

    /// Stops polling and forgets the last sample, so a stopped detector
    /// reports uncovered. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        self.covered = false;
        self.next_tick.take().is_some()
    }

    /// Starts or stops with the attachment of `layer`.
    ///
    /// Returns whether the detector is running afterwards.
    pub fn follow_attachment(&mut self, store: &LayerStore, layer: LayerId, now: HostTime) -> bool {
        if store.is_attached(layer) {
            self.start(now);
        } else {
            self.stop();
        }
        self.is_running()
    }

    /// Whether the detector is polling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// The latest sampled coverage.
    #[must_use]
    pub fn is_covered(&self) -> bool {
        self.covered
    }

    /// When the next sample is due, if running.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        self.next_tick
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> PresentationConfig {
        self.config
    }

    /// Takes one sample if a tick is due.
    ///
    /// At most one sample is taken per call; ticks missed while the host was
    /// busy are skipped, and the next one is scheduled from `now`.
    pub fn poll<Q: OverlayQuery + ?Sized>(
        &mut self,
        now: HostTime,
        query: &mut Q,
        tracer: &mut Tracer<'_>,
    ) -> PollOutcome {
        match self.next_tick {
            Some(due) if due <= now => {}
            _ => return PollOutcome::Idle,
        }

        let covered = query.is_covered();
        let dismissed = self.covered && !covered;
        self.covered = covered;
        self.next_tick = Some(now + self.config.poll_interval);
        tracer.overlay_poll(&OverlayPollEvent {
            now,
            covered,
            dismissed,
        });

        if !dismissed {
            return PollOutcome::Sampled { covered };
        }
        for callback in &mut self.on_dismissed {
            callback(now);
        }
        PollOutcome::Dismissed
    }
}

impl OverlayProbe for PresentationDetector {
    fn covers(&mut self, _item: ItemId) -> bool {
        self.covered
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::{Cell, RefCell};

    use super::*;
    use crate::impression::{ImpressionConfig, ImpressionHandler, ImpressionTracker};

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    #[test]
    fn default_rate_is_fifteen_hertz() {
        let interval = PresentationConfig::default().poll_interval;
        assert_eq!(interval.as_nanos(), 66_666_666);
    }

    #[test]
    fn only_covered_to_uncovered_fires() {
        let mut detector = PresentationDetector::default();
        let mut tracer = Tracer::none();
        let dismissals = Rc::new(RefCell::new(Vec::new()));
        let d = Rc::clone(&dismissals);
        detector.on_dismissed(move |at| d.borrow_mut().push(at));

        let script = [false, true, true, false, false, true, false];
        let mut answers = script.iter().copied();
        let mut query = || answers.next().unwrap_or(false);

        assert!(detector.start(ms(0)));
        let mut outcomes = Vec::new();
        for step in 0..script.len() as u64 {
            outcomes.push(detector.poll(ms(step * 100), &mut query, &mut tracer));
        }

        assert_eq!(
            outcomes,
            vec![
                PollOutcome::Sampled { covered: false },
                PollOutcome::Sampled { covered: true },
                PollOutcome::Sampled { covered: true },
                PollOutcome::Dismissed,
                PollOutcome::Sampled { covered: false },
                PollOutcome::Sampled { covered: true },
                PollOutcome::Dismissed,
            ]
        );
        assert_eq!(*dismissals.borrow(), vec![ms(300), ms(600)]);
    }

    #[test]
    fn polls_are_rate_limited_without_catch_up() {
        let mut detector = PresentationDetector::default();
        let mut tracer = Tracer::none();
        let samples = Cell::new(0);
        let mut query = || {
            samples.set(samples.get() + 1);
            false
        };

        detector.start(ms(0));
        assert_ne!(detector.poll(ms(0), &mut query, &mut tracer), PollOutcome::Idle);
        assert_eq!(detector.poll(ms(30), &mut query, &mut tracer), PollOutcome::Idle);

        // A long stall yields one sample, not a burst.
        assert_ne!(detector.poll(ms(1_000), &mut query, &mut tracer), PollOutcome::Idle);
        assert_eq!(detector.poll(ms(1_000), &mut query, &mut tracer), PollOutcome::Idle);
        assert_eq!(samples.get(), 2);
        assert_eq!(detector.next_deadline(), Some(ms(1_000) + detector.config().poll_interval));
    }

    #[test]
    fn stop_is_idempotent_and_silences_polls() {
        let mut detector = PresentationDetector::default();
        let mut tracer = Tracer::none();
        let mut query = || true;

        assert!(!detector.stop());
        detector.start(ms(0));
        assert!(!detector.start(ms(5)));
        assert!(detector.stop());
        assert!(!detector.stop());
        assert_eq!(detector.poll(ms(100), &mut query, &mut tracer), PollOutcome::Idle);
    }

    #[test]
    fn stopped_detector_no_longer_reports_covered() {
        let mut detector = PresentationDetector::default();
        let mut tracer = Tracer::none();

        detector.start(ms(0));
        detector.poll(ms(0), &mut || true, &mut tracer);
        assert!(detector.covers(ItemId(1)));

        detector.stop();
        assert!(!detector.is_covered());
        assert!(!detector.covers(ItemId(1)));
    }

    #[test]
    fn follows_layer_attachment() {
        let mut store = LayerStore::new();
        let root = store.create_layer();
        let _ = store.evaluate();
        let mut detector = PresentationDetector::default();

        assert!(!detector.follow_attachment(&store, root, ms(0)));

        store.mount(root);
        let _ = store.evaluate();
        assert!(detector.follow_attachment(&store, root, ms(10)));
        assert_eq!(detector.next_deadline(), Some(ms(10)));

        store.unmount(root);
        let _ = store.evaluate();
        assert!(!detector.follow_attachment(&store, root, ms(20)));
    }

    #[test]
    fn gates_impressions_with_latest_sample() {
        struct Count(usize);
        impl ImpressionHandler for Count {
            fn on_view(&mut self, _item: ItemId, _visibility: f64) {
                self.0 += 1;
            }
        }

        let mut detector = PresentationDetector::default();
        let mut tracker = ImpressionTracker::new(ImpressionConfig::default(), Count(0));
        let mut tracer = Tracer::none();
        let item = ItemId(1);

        detector.start(ms(0));
        detector.poll(ms(0), &mut || true, &mut tracer);
        tracker.update_visibility(item, 0.8, ms(0), &mut tracer);
        assert_eq!(tracker.advance_with(ms(1_000), &mut detector, &mut tracer), 0);

        detector.poll(ms(1_100), &mut || false, &mut tracer);
        tracker.update_visibility(item, 0.8, ms(1_100), &mut tracer);
        assert_eq!(tracker.advance_with(ms(2_100), &mut detector, &mut tracer), 1);
        assert_eq!(tracker.handler().0, 1);
    }
}
