// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the viewability pipeline.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! observers, the impression tracker, and the presentation detector call as
//! they make decisions. All method bodies default to no-ops, so implementing
//! only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies (one branch per call).

use crate::impression::ItemId;
use crate::observer::RecomputeOutcome;
use crate::registry::{Place, TrackedId};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why an observer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The owner called `stop` or `stop_all`.
    Explicit,
    /// The observed layer was destroyed.
    LayerDead,
}

/// What happened on an item's impression tracks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImpressionEventKind {
    /// The render callback fired.
    Rendered,
    /// A duration timer started; it elapses at `deadline`.
    TimerStarted {
        /// When the timer elapses.
        deadline: HostTime,
    },
    /// A running timer (or outstanding overlay check) was dropped because
    /// visibility fell below the threshold.
    TimerCancelled,
    /// The timer elapsed and an overlay check was handed to the host.
    OverlayCheckRequested,
    /// The overlay check reported coverage; the attempt was discarded.
    OverlayAborted,
    /// The view callback fired with the given visibility.
    Viewed {
        /// Visibility recorded while the timer ran.
        visibility: f64,
    },
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after every debounced observer recomputation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecomputeEvent {
    /// The observed element.
    pub id: TrackedId,
    /// The element's place.
    pub place: Place,
    /// Host time of the recomputation.
    pub now: HostTime,
    /// What the recomputation did.
    pub outcome: RecomputeOutcome,
}

/// Emitted when an observer stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverStoppedEvent {
    /// The observed element.
    pub id: TrackedId,
    /// Host time of the stop.
    pub now: HostTime,
    /// Why it stopped.
    pub reason: StopReason,
}

/// Emitted on each impression state transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpressionEvent {
    /// The logical item.
    pub item: ItemId,
    /// Host time of the transition.
    pub now: HostTime,
    /// The transition.
    pub kind: ImpressionEventKind,
}

/// Emitted for every overlay sample taken by the presentation detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayPollEvent {
    /// Host time of the sample.
    pub now: HostTime,
    /// Whether an overlay covered the context.
    pub covered: bool,
    /// Whether this sample was a covered-to-uncovered transition.
    pub dismissed: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the viewability pipeline.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after an observer recomputation.
    fn on_recompute(&mut self, e: &RecomputeEvent) {
        _ = e;
    }

    /// Called when an observer stops.
    fn on_observer_stopped(&mut self, e: &ObserverStoppedEvent) {
        _ = e;
    }

    /// Called on an impression state transition.
    fn on_impression(&mut self, e: &ImpressionEvent) {
        _ = e;
    }

    /// Called for every overlay sample.
    fn on_overlay_poll(&mut self, e: &OverlayPollEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`RecomputeEvent`].
    #[inline]
    pub fn recompute(&mut self, e: &RecomputeEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_recompute(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`ObserverStoppedEvent`].
    #[inline]
    pub fn observer_stopped(&mut self, e: &ObserverStoppedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_observer_stopped(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`ImpressionEvent`].
    #[inline]
    pub fn impression(&mut self, e: &ImpressionEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_impression(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`OverlayPollEvent`].
    #[inline]
    pub fn overlay_poll(&mut self, e: &OverlayPollEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_overlay_poll(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
