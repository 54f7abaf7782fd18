// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render and viewable-impression tracking.
//!
//! One [`ImpressionTracker`] serves every item of one catalog (typically one
//! scroll container). Each item has two independent one-shot tracks:
//!
//! - **Render** fires the first time [`track_render`] sees the item.
//! - **View** fires once the item stayed at or above the visibility threshold
//!   for the full time threshold *and* no overlay covered its context when
//!   the timer elapsed.
//!
//! ```text
//!                  ≥ threshold            timer elapsed          not covered
//!  BelowThreshold ─────────────► Timing ───────────────► Awaiting ─────────► Fired
//!        ▲                          │                       │
//!        └──────── < threshold ─────┴──── < threshold ──────┤
//!        └────────────────────────── covered ───────────────┘
//! ```
//!
//! Dropping below the threshold forfeits all elapsed time. The overlay check
//! is asynchronous: [`advance`] hands out [`OverlayCheck`] tokens and the host
//! answers with [`resolve_overlay_check`]. Answers to checks that were
//! overtaken by a drop or a [`reset`] are ignored.
//!
//! [`track_render`]: ImpressionTracker::track_render
//! [`advance`]: ImpressionTracker::advance
//! [`resolve_overlay_check`]: ImpressionTracker::resolve_overlay_check
//! [`reset`]: ImpressionTracker::reset

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

use crate::deadline::DeadlineQueue;
use crate::time::{Duration, HostTime};
use crate::trace::{ImpressionEvent, ImpressionEventKind, Tracer};
use crate::visibility::VisibilityStrategy;

/// Identity of a logical item (an ad slot, a feed row).
///
/// Distinct from [`TrackedId`](crate::registry::TrackedId): an item may be
/// drawn by different layers over its lifetime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u64);

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

/// Impression thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpressionConfig {
    /// Minimum visible fraction, inclusive.
    pub visibility_threshold: f64,
    /// How long the item must stay at or above the threshold.
    pub time_threshold: Duration,
}

impl Default for ImpressionConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.5,
            time_threshold: Duration::from_secs(1),
        }
    }
}

/// Receives impression callbacks.
pub trait ImpressionHandler {
    /// The item was rendered for the first time.
    fn on_render(&mut self, item: ItemId) {
        _ = item;
    }

    /// The item earned its viewable impression.
    fn on_view(&mut self, item: ItemId, visibility: f64) {
        _ = (item, visibility);
    }
}

/// Answers "is this item's context covered by an overlay right now".
pub trait OverlayProbe {
    /// Returns whether an overlay covers `item`'s context.
    fn covers(&mut self, item: ItemId) -> bool;
}

impl<F: FnMut(ItemId) -> bool> OverlayProbe for F {
    fn covers(&mut self, item: ItemId) -> bool {
        self(item)
    }
}

/// An outstanding overlay check, returned by
/// [`ImpressionTracker::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayCheck {
    item: ItemId,
    token: u64,
}

impl OverlayCheck {
    /// The item whose timer elapsed.
    #[must_use]
    pub fn item(&self) -> ItemId {
        self.item
    }
}

/// Where an item is on its view track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewPhase {
    /// Not qualifying, no timer.
    BelowThreshold,
    /// Qualifying; the timer elapses at `deadline`.
    Timing {
        /// When the timer elapses.
        deadline: HostTime,
    },
    /// The timer elapsed and an overlay check is outstanding.
    AwaitingOverlay {
        /// Token of the outstanding check.
        token: u64,
    },
    /// The view impression fired. Terminal.
    Fired,
}

/// Per-item impression state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpressionState {
    render_fired: bool,
    phase: ViewPhase,
    last_visibility_during_timer: Option<f64>,
    fired_visibility: Option<f64>,
}

impl Default for ImpressionState {
    fn default() -> Self {
        Self {
            render_fired: false,
            phase: ViewPhase::BelowThreshold,
            last_visibility_during_timer: None,
            fired_visibility: None,
        }
    }
}

impl ImpressionState {
    /// Whether the render callback fired.
    #[must_use]
    pub fn render_fired(&self) -> bool {
        self.render_fired
    }

    /// Whether the view callback fired.
    #[must_use]
    pub fn view_fired(&self) -> bool {
        self.phase == ViewPhase::Fired
    }

    /// Whether a timer or overlay check is outstanding.
    #[must_use]
    pub fn timer_active(&self) -> bool {
        matches!(
            self.phase,
            ViewPhase::Timing { .. } | ViewPhase::AwaitingOverlay { .. }
        )
    }

    /// The view-track phase.
    #[must_use]
    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    /// The latest qualifying visibility since the timer started.
    #[must_use]
    pub fn last_visibility_during_timer(&self) -> Option<f64> {
        self.last_visibility_during_timer
    }

    /// The visibility reported with the view callback.
    #[must_use]
    pub fn fired_visibility(&self) -> Option<f64> {
        self.fired_visibility
    }
}

/// Render and viewable-impression state for one catalog of items.
pub struct ImpressionTracker<H> {
    config: ImpressionConfig,
    handler: H,
    states: BTreeMap<ItemId, ImpressionState>,
    timers: DeadlineQueue<ItemId>,
    next_token: u64,
}

impl<H> fmt::Debug for ImpressionTracker<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpressionTracker")
            .field("config", &self.config)
            .field("items", &self.states.len())
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl<H: ImpressionHandler> ImpressionTracker<H> {
    /// Creates a tracker that reports to `handler`.
    pub fn new(config: ImpressionConfig, handler: H) -> Self {
        Self {
            config,
            handler,
            states: BTreeMap::new(),
            timers: DeadlineQueue::new(),
            next_token: 0,
        }
    }

    /// Fires the render callback for `item` unless it already fired.
    ///
    /// Returns whether it fired now.
    pub fn track_render(&mut self, item: ItemId, now: HostTime, tracer: &mut Tracer<'_>) -> bool {
        let state = self.states.entry(item).or_default();
        if state.render_fired {
            return false;
        }
        state.render_fired = true;
        self.handler.on_render(item);
        tracer.impression(&ImpressionEvent {
            item,
            now,
            kind: ImpressionEventKind::Rendered,
        });
        true
    }

    /// Feeds a visibility sample for `item`.
    ///
    /// The fraction is clamped to `[0, 1]`; NaN counts as 0. Samples for an
    /// item whose view impression fired are ignored.
    pub fn update_visibility(
        &mut self,
        item: ItemId,
        percentage: f64,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        let percentage = if percentage.is_nan() {
            0.0
        } else {
            percentage.clamp(0.0, 1.0)
        };
        let state = self.states.entry(item).or_default();
        if state.phase == ViewPhase::Fired {
            return;
        }

        if percentage >= self.config.visibility_threshold {
            state.last_visibility_during_timer = Some(percentage);
            if state.phase == ViewPhase::BelowThreshold {
                let deadline = now + self.config.time_threshold;
                state.phase = ViewPhase::Timing { deadline };
                self.timers.schedule(item, deadline);
                tracer.impression(&ImpressionEvent {
                    item,
                    now,
                    kind: ImpressionEventKind::TimerStarted { deadline },
                });
            }
        } else {
            state.last_visibility_during_timer = None;
            if state.timer_active() {
                state.phase = ViewPhase::BelowThreshold;
                self.timers.cancel(item);
                tracer.impression(&ImpressionEvent {
                    item,
                    now,
                    kind: ImpressionEventKind::TimerCancelled,
                });
            }
        }
    }

    /// Measures `target` through `strategy`, fires the render callback on the
    /// first sample, and feeds the result to
    /// [`update_visibility`](Self::update_visibility).
    ///
    /// Returns the measured fraction.
    pub fn sample<S: VisibilityStrategy + ?Sized>(
        &mut self,
        item: ItemId,
        target: Rect,
        viewport: Rect,
        strategy: &S,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) -> f64 {
        let percentage = strategy.percentage_visible(target, viewport);
        self.track_render(item, now, tracer);
        self.update_visibility(item, percentage, now, tracer);
        percentage
    }

    /// Collects the timers that elapsed at or before `now`.
    ///
    /// Each elapsed timer becomes an [`OverlayCheck`] the host must answer
    /// with [`resolve_overlay_check`](Self::resolve_overlay_check).
    pub fn advance(&mut self, now: HostTime, tracer: &mut Tracer<'_>) -> Vec<OverlayCheck> {
        let mut checks = Vec::new();
        for item in self.timers.expire(now) {
            let Some(state) = self.states.get_mut(&item) else {
                continue;
            };
            if !matches!(state.phase, ViewPhase::Timing { .. }) {
                continue;
            }
            let token = self.next_token;
            self.next_token += 1;
            state.phase = ViewPhase::AwaitingOverlay { token };
            tracer.impression(&ImpressionEvent {
                item,
                now,
                kind: ImpressionEventKind::OverlayCheckRequested,
            });
            checks.push(OverlayCheck { item, token });
        }
        checks
    }

    /// Completes an overlay check.
    ///
    /// If `covered`, the attempt is discarded as if visibility had dropped.
    /// Otherwise the view callback fires, preceded by the render callback if
    /// that never fired. Returns whether it fired; stale
    /// checks return `false` and change nothing.
    pub fn resolve_overlay_check(
        &mut self,
        check: OverlayCheck,
        covered: bool,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) -> bool {
        let Some(state) = self.states.get_mut(&check.item) else {
            return false;
        };
        if state.phase != (ViewPhase::AwaitingOverlay { token: check.token }) {
            return false;
        }
        let visibility = match state.last_visibility_during_timer {
            Some(v) if !covered => v,
            _ => {
                state.phase = ViewPhase::BelowThreshold;
                state.last_visibility_during_timer = None;
                tracer.impression(&ImpressionEvent {
                    item: check.item,
                    now,
                    kind: ImpressionEventKind::OverlayAborted,
                });
                return false;
            }
        };

        // A viewed item was rendered; the state is frozen from here on.
        if !state.render_fired {
            state.render_fired = true;
            self.handler.on_render(check.item);
            tracer.impression(&ImpressionEvent {
                item: check.item,
                now,
                kind: ImpressionEventKind::Rendered,
            });
        }
        state.phase = ViewPhase::Fired;
        state.fired_visibility = Some(visibility);
        self.handler.on_view(check.item, visibility);
        tracer.impression(&ImpressionEvent {
            item: check.item,
            now,
            kind: ImpressionEventKind::Viewed { visibility },
        });
        true
    }

    /// [`advance`](Self::advance) and resolve every check through `probe`
    /// immediately.
    ///
    /// Returns how many view impressions fired.
    pub fn advance_with<P: OverlayProbe + ?Sized>(
        &mut self,
        now: HostTime,
        probe: &mut P,
        tracer: &mut Tracer<'_>,
    ) -> usize {
        let mut fired = 0;
        for check in self.advance(now, tracer) {
            let covered = probe.covers(check.item);
            if self.resolve_overlay_check(check, covered, now, tracer) {
                fired += 1;
            }
        }
        fired
    }

    /// Cancels every timer and forgets every item.
    pub fn reset(&mut self) {
        self.timers.clear();
        self.states.clear();
    }

    /// Returns the state of `item`, if it was ever sampled.
    #[must_use]
    pub fn state(&self, item: ItemId) -> Option<&ImpressionState> {
        self.states.get(&item)
    }

    /// Whether the render callback fired for `item`.
    #[must_use]
    pub fn has_fired_render_impression(&self, item: ItemId) -> bool {
        self.state(item).is_some_and(ImpressionState::render_fired)
    }

    /// Whether the view callback fired for `item`.
    #[must_use]
    pub fn has_fired_view_impression(&self, item: ItemId) -> bool {
        self.state(item).is_some_and(ImpressionState::view_fired)
    }

    /// The visibility reported when `item`'s view impression fired.
    #[must_use]
    pub fn visibility_for_fired_impression(&self, item: ItemId) -> Option<f64> {
        self.state(item).and_then(ImpressionState::fired_visibility)
    }

    /// Whether `item` has a running timer or outstanding overlay check.
    #[must_use]
    pub fn is_timer_active(&self, item: ItemId) -> bool {
        self.state(item).is_some_and(ImpressionState::timer_active)
    }

    /// The earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        self.timers.next_deadline()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> ImpressionConfig {
        self.config
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the handler mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::registry::{ObstructionRegistry, Place};
    use crate::visibility::RegistryObstructions;

    const AD: ItemId = ItemId(7);

    #[derive(Default)]
    struct Recorder {
        renders: Vec<ItemId>,
        views: Vec<(ItemId, f64)>,
    }

    impl ImpressionHandler for Recorder {
        fn on_render(&mut self, item: ItemId) {
            self.renders.push(item);
        }

        fn on_view(&mut self, item: ItemId, visibility: f64) {
            self.views.push((item, visibility));
        }
    }

    fn tracker() -> ImpressionTracker<Recorder> {
        ImpressionTracker::new(ImpressionConfig::default(), Recorder::default())
    }

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    fn clear(_: ItemId) -> bool {
        false
    }

    #[test]
    fn view_fires_once_after_time_threshold() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        assert!(t.is_timer_active(AD));
        assert_eq!(t.advance_with(ms(999), &mut clear, &mut tracer), 0);
        assert_eq!(t.advance_with(ms(1_000), &mut clear, &mut tracer), 1);

        assert_eq!(t.handler().views, vec![(AD, 0.6)]);
        assert!(t.has_fired_view_impression(AD));
        assert_eq!(t.visibility_for_fired_impression(AD), Some(0.6));

        // Terminal.
        t.update_visibility(AD, 0.9, ms(1_500), &mut tracer);
        t.update_visibility(AD, 0.1, ms(1_600), &mut tracer);
        assert_eq!(t.advance_with(ms(5_000), &mut clear, &mut tracer), 0);
        assert_eq!(t.handler().views.len(), 1);
        assert_eq!(t.visibility_for_fired_impression(AD), Some(0.6));
    }

    #[test]
    fn drop_below_threshold_forfeits_elapsed_time() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        t.update_visibility(AD, 0.3, ms(500), &mut tracer);
        assert!(!t.is_timer_active(AD));
        assert_eq!(t.state(AD).unwrap().last_visibility_during_timer(), None);
        assert_eq!(t.advance_with(ms(1_500), &mut clear, &mut tracer), 0);
        assert!(t.handler().views.is_empty());

        // Qualifying again restarts the full duration.
        t.update_visibility(AD, 0.7, ms(1_600), &mut tracer);
        assert_eq!(t.advance_with(ms(2_599), &mut clear, &mut tracer), 0);
        assert_eq!(t.advance_with(ms(2_600), &mut clear, &mut tracer), 1);
    }

    #[test]
    fn qualifying_samples_keep_the_running_timer() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        t.update_visibility(AD, 0.8, ms(500), &mut tracer);
        assert_eq!(
            t.state(AD).unwrap().phase(),
            ViewPhase::Timing {
                deadline: ms(1_000)
            }
        );
        assert_eq!(t.advance_with(ms(1_000), &mut clear, &mut tracer), 1);
        assert_eq!(t.visibility_for_fired_impression(AD), Some(0.8));
    }

    #[test]
    fn overlay_at_expiry_aborts_and_requires_full_duration_again() {
        let mut t = tracker();
        let mut tracer = Tracer::none();
        let mut covered = |_: ItemId| true;

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        assert_eq!(t.advance_with(ms(1_000), &mut covered, &mut tracer), 0);
        assert!(!t.is_timer_active(AD));
        assert!(t.handler().views.is_empty());

        // Overlay gone; a fresh qualifying sample starts over.
        t.update_visibility(AD, 0.6, ms(2_000), &mut tracer);
        assert_eq!(t.advance_with(ms(2_500), &mut clear, &mut tracer), 0);
        assert_eq!(t.advance_with(ms(3_000), &mut clear, &mut tracer), 1);
        assert_eq!(t.handler().views, vec![(AD, 0.6)]);
    }

    #[test]
    fn drop_while_check_is_outstanding_makes_answer_stale() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        let checks = t.advance(ms(1_000), &mut tracer);
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].item(), AD);
        assert!(t.is_timer_active(AD));

        t.update_visibility(AD, 0.2, ms(1_010), &mut tracer);
        assert!(!t.resolve_overlay_check(checks[0], false, ms(1_020), &mut tracer));
        assert!(!t.has_fired_view_impression(AD));
    }

    #[test]
    fn samples_during_check_update_reported_visibility() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        let checks = t.advance(ms(1_000), &mut tracer);
        t.update_visibility(AD, 0.9, ms(1_005), &mut tracer);
        assert!(t.resolve_overlay_check(checks[0], false, ms(1_010), &mut tracer));
        assert_eq!(t.visibility_for_fired_impression(AD), Some(0.9));
    }

    #[test]
    fn reset_cancels_timers_and_outstanding_checks() {
        let mut t = tracker();
        let mut tracer = Tracer::none();
        let other = ItemId(8);

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        t.update_visibility(other, 0.6, ms(100), &mut tracer);
        let checks = t.advance(ms(1_000), &mut tracer);
        assert_eq!(checks.len(), 1);

        t.reset();
        assert!(!t.resolve_overlay_check(checks[0], false, ms(1_000), &mut tracer));
        assert_eq!(t.next_deadline(), None);
        assert!(t.state(AD).is_none());
        assert_eq!(t.advance_with(ms(5_000), &mut clear, &mut tracer), 0);
    }

    #[test]
    fn render_fires_once_and_independently() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        assert!(t.track_render(AD, ms(0), &mut tracer));
        assert!(!t.track_render(AD, ms(10), &mut tracer));
        assert!(t.has_fired_render_impression(AD));
        assert!(!t.has_fired_view_impression(AD));
        assert_eq!(t.handler().renders, vec![AD]);
    }

    #[test]
    fn view_without_render_fires_render_first_and_freezes_state() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        t.update_visibility(AD, 0.6, ms(0), &mut tracer);
        assert_eq!(t.advance_with(ms(1_000), &mut clear, &mut tracer), 1);
        assert_eq!(t.handler().renders, vec![AD]);
        assert!(t.has_fired_render_impression(AD));

        let frozen = t.state(AD).copied();
        assert!(!t.track_render(AD, ms(2_000), &mut tracer));
        assert_eq!(t.state(AD).copied(), frozen);
        assert_eq!(t.handler().renders, vec![AD]);
    }

    #[test]
    fn nan_and_out_of_range_samples_are_clamped() {
        let mut t = tracker();
        let mut tracer = Tracer::none();

        t.update_visibility(AD, f64::NAN, ms(0), &mut tracer);
        assert!(!t.is_timer_active(AD));
        t.update_visibility(AD, 7.0, ms(0), &mut tracer);
        assert_eq!(t.state(AD).unwrap().last_visibility_during_timer(), Some(1.0));
    }

    #[test]
    fn sample_measures_through_strategy() {
        let mut registry = ObstructionRegistry::new();
        let header = registry.mint_id();
        registry.register_or_update(header, Rect::new(0.0, 0.0, 100.0, 40.0), Place(0), true);

        let mut t = tracker();
        let mut tracer = Tracer::none();
        let strategy = RegistryObstructions::new(&registry, Place(0));
        let viewport = Rect::new(0.0, 0.0, 100.0, 400.0);

        let pct = t.sample(
            AD,
            Rect::new(0.0, 0.0, 100.0, 100.0),
            viewport,
            &strategy,
            ms(0),
            &mut tracer,
        );
        assert_eq!(pct, 0.6);
        assert!(t.has_fired_render_impression(AD));
        assert!(t.is_timer_active(AD));
    }
}
