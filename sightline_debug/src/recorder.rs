// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records, one tag byte followed by the event's
//! fields. [`decode`] reads them back as an iterator of [`RecordedEvent`].

use kurbo::Rect;
use sightline_core::impression::ItemId;
use sightline_core::observer::RecomputeOutcome;
use sightline_core::registry::{Place, TrackedId};
use sightline_core::time::HostTime;
use sightline_core::trace::{
    ImpressionEvent, ImpressionEventKind, ObserverStoppedEvent, OverlayPollEvent, RecomputeEvent,
    StopReason, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_RECOMPUTE: u8 = 1;
const TAG_OBSERVER_STOPPED: u8 = 2;
const TAG_IMPRESSION: u8 = 3;
const TAG_OVERLAY_POLL: u8 = 4;

const OUTCOME_REGISTERED: u8 = 0;
const OUTCOME_UNCHANGED: u8 = 1;
const OUTCOME_NOT_LAID_OUT: u8 = 2;
const OUTCOME_DETACHED: u8 = 3;

const KIND_RENDERED: u8 = 0;
const KIND_TIMER_STARTED: u8 = 1;
const KIND_TIMER_CANCELLED: u8 = 2;
const KIND_OVERLAY_CHECK: u8 = 3;
const KIND_OVERLAY_ABORTED: u8 = 4;
const KIND_VIEWED: u8 = 5;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_rect(&mut self, r: Rect) {
        self.write_f64(r.x0);
        self.write_f64(r.y0);
        self.write_f64(r.x1);
        self.write_f64(r.y1);
    }
}

impl TraceSink for RecorderSink {
    fn on_recompute(&mut self, e: &RecomputeEvent) {
        self.write_u8(TAG_RECOMPUTE);
        self.write_u64(e.id.get());
        self.write_u32(e.place.0);
        self.write_u64(e.now.nanos());
        match e.outcome {
            RecomputeOutcome::Registered { frame, visible } => {
                self.write_u8(OUTCOME_REGISTERED);
                self.write_rect(frame);
                self.write_bool(visible);
            }
            RecomputeOutcome::Unchanged => self.write_u8(OUTCOME_UNCHANGED),
            RecomputeOutcome::NotLaidOut => self.write_u8(OUTCOME_NOT_LAID_OUT),
            RecomputeOutcome::Detached => self.write_u8(OUTCOME_DETACHED),
        }
    }

    fn on_observer_stopped(&mut self, e: &ObserverStoppedEvent) {
        self.write_u8(TAG_OBSERVER_STOPPED);
        self.write_u64(e.id.get());
        self.write_u64(e.now.nanos());
        self.write_u8(match e.reason {
            StopReason::Explicit => 0,
            StopReason::LayerDead => 1,
        });
    }

    fn on_impression(&mut self, e: &ImpressionEvent) {
        self.write_u8(TAG_IMPRESSION);
        self.write_u64(e.item.0);
        self.write_u64(e.now.nanos());
        match e.kind {
            ImpressionEventKind::Rendered => self.write_u8(KIND_RENDERED),
            ImpressionEventKind::TimerStarted { deadline } => {
                self.write_u8(KIND_TIMER_STARTED);
                self.write_u64(deadline.nanos());
            }
            ImpressionEventKind::TimerCancelled => self.write_u8(KIND_TIMER_CANCELLED),
            ImpressionEventKind::OverlayCheckRequested => self.write_u8(KIND_OVERLAY_CHECK),
            ImpressionEventKind::OverlayAborted => self.write_u8(KIND_OVERLAY_ABORTED),
            ImpressionEventKind::Viewed { visibility } => {
                self.write_u8(KIND_VIEWED);
                self.write_f64(visibility);
            }
        }
    }

    fn on_overlay_poll(&mut self, e: &OverlayPollEvent) {
        self.write_u8(TAG_OVERLAY_POLL);
        self.write_u64(e.now.nanos());
        self.write_bool(e.covered);
        self.write_bool(e.dismissed);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A [`RecomputeEvent`].
    Recompute(RecomputeEvent),
    /// An [`ObserverStoppedEvent`].
    ObserverStopped(ObserverStoppedEvent),
    /// An [`ImpressionEvent`].
    Impression(ImpressionEvent),
    /// An [`OverlayPollEvent`].
    OverlayPoll(OverlayPollEvent),
}

impl RecordedEvent {
    /// Host time at which the event was emitted.
    #[must_use]
    pub fn time(&self) -> HostTime {
        match self {
            Self::Recompute(e) => e.now,
            Self::ObserverStopped(e) => e.now,
            Self::Impression(e) => e.now,
            Self::OverlayPoll(e) => e.now,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes: [u8; N] = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.take().map(f64::from_le_bytes)
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|b| b != 0)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_rect(&mut self) -> Option<Rect> {
        Some(Rect::new(
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
        ))
    }

    fn decode_recompute(&mut self) -> Option<RecordedEvent> {
        let id = TrackedId::from_raw(self.read_u64()?);
        let place = Place(self.read_u32()?);
        let now = self.read_time()?;
        let outcome = match self.read_u8()? {
            OUTCOME_REGISTERED => RecomputeOutcome::Registered {
                frame: self.read_rect()?,
                visible: self.read_bool()?,
            },
            OUTCOME_UNCHANGED => RecomputeOutcome::Unchanged,
            OUTCOME_NOT_LAID_OUT => RecomputeOutcome::NotLaidOut,
            OUTCOME_DETACHED => RecomputeOutcome::Detached,
            _ => return None,
        };
        Some(RecordedEvent::Recompute(RecomputeEvent {
            id,
            place,
            now,
            outcome,
        }))
    }

    fn decode_observer_stopped(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::ObserverStopped(ObserverStoppedEvent {
            id: TrackedId::from_raw(self.read_u64()?),
            now: self.read_time()?,
            reason: match self.read_u8()? {
                0 => StopReason::Explicit,
                _ => StopReason::LayerDead,
            },
        }))
    }

    fn decode_impression(&mut self) -> Option<RecordedEvent> {
        let item = ItemId(self.read_u64()?);
        let now = self.read_time()?;
        let kind = match self.read_u8()? {
            KIND_RENDERED => ImpressionEventKind::Rendered,
            KIND_TIMER_STARTED => ImpressionEventKind::TimerStarted {
                deadline: self.read_time()?,
            },
            KIND_TIMER_CANCELLED => ImpressionEventKind::TimerCancelled,
            KIND_OVERLAY_CHECK => ImpressionEventKind::OverlayCheckRequested,
            KIND_OVERLAY_ABORTED => ImpressionEventKind::OverlayAborted,
            KIND_VIEWED => ImpressionEventKind::Viewed {
                visibility: self.read_f64()?,
            },
            _ => return None,
        };
        Some(RecordedEvent::Impression(ImpressionEvent { item, now, kind }))
    }

    fn decode_overlay_poll(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::OverlayPoll(OverlayPollEvent {
            now: self.read_time()?,
            covered: self.read_bool()?,
            dismissed: self.read_bool()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_RECOMPUTE => self.decode_recompute(),
            TAG_OBSERVER_STOPPED => self.decode_observer_stopped(),
            TAG_IMPRESSION => self.decode_impression(),
            TAG_OVERLAY_POLL => self.decode_overlay_poll(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
