// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are printed in milliseconds.

use std::io::Write;

use sightline_core::observer::RecomputeOutcome;
use sightline_core::time::HostTime;
use sightline_core::trace::{
    ImpressionEvent, ImpressionEventKind, ObserverStoppedEvent, OverlayPollEvent, RecomputeEvent,
    StopReason, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns the destination.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn ms(t: HostTime) -> f64 {
    t.nanos() as f64 / 1_000_000.0
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_recompute(&mut self, e: &RecomputeEvent) {
        let outcome = match e.outcome {
            RecomputeOutcome::Registered { frame, visible } => format!(
                "registered frame=({:.1},{:.1})-({:.1},{:.1}) visible={visible}",
                frame.x0, frame.y0, frame.x1, frame.y1,
            ),
            RecomputeOutcome::Unchanged => "unchanged".to_owned(),
            RecomputeOutcome::NotLaidOut => "not-laid-out".to_owned(),
            RecomputeOutcome::Detached => "detached".to_owned(),
        };
        let _ = writeln!(
            self.writer,
            "[recompute] id={} place={} at {:.3}ms {outcome}",
            e.id.get(),
            e.place.0,
            ms(e.now),
        );
    }

    fn on_observer_stopped(&mut self, e: &ObserverStoppedEvent) {
        let reason = match e.reason {
            StopReason::Explicit => "explicit",
            StopReason::LayerDead => "layer-dead",
        };
        let _ = writeln!(
            self.writer,
            "[observer:stop] id={} at {:.3}ms reason={reason}",
            e.id.get(),
            ms(e.now),
        );
    }

    fn on_impression(&mut self, e: &ImpressionEvent) {
        let what = match e.kind {
            ImpressionEventKind::Rendered => "rendered".to_owned(),
            ImpressionEventKind::TimerStarted { deadline } => {
                format!("timer-started deadline={:.3}ms", ms(deadline))
            }
            ImpressionEventKind::TimerCancelled => "timer-cancelled".to_owned(),
            ImpressionEventKind::OverlayCheckRequested => "overlay-check".to_owned(),
            ImpressionEventKind::OverlayAborted => "overlay-aborted".to_owned(),
            ImpressionEventKind::Viewed { visibility } => {
                format!("VIEWED visibility={visibility:.3}")
            }
        };
        let _ = writeln!(
            self.writer,
            "[impression] item={} at {:.3}ms {what}",
            e.item.0,
            ms(e.now),
        );
    }

    fn on_overlay_poll(&mut self, e: &OverlayPollEvent) {
        let edge = if e.dismissed { " DISMISSED" } else { "" };
        let _ = writeln!(
            self.writer,
            "[overlay] at {:.3}ms covered={}{edge}",
            ms(e.now),
            e.covered,
        );
    }
}
