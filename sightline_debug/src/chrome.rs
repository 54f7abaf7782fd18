// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Each impression timer becomes an async slice (`b`/`e` pair keyed by item
//! id) running from the qualifying sample to its cancellation, abort, or
//! view. Overlay samples become a counter track; everything else is an
//! instant event.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use sightline_core::observer::RecomputeOutcome;
use sightline_core::time::HostTime;
use sightline_core::trace::ImpressionEventKind;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted from nanoseconds to microseconds.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::Recompute(e) => {
                let (outcome, frame, visible) = match e.outcome {
                    RecomputeOutcome::Registered { frame, visible } => (
                        "registered",
                        Some([frame.x0, frame.y0, frame.x1, frame.y1]),
                        Some(visible),
                    ),
                    RecomputeOutcome::Unchanged => ("unchanged", None, None),
                    RecomputeOutcome::NotLaidOut => ("not_laid_out", None, None),
                    RecomputeOutcome::Detached => ("detached", None, None),
                };
                events.push(json!({
                    "ph": "i",
                    "name": "Recompute",
                    "cat": "Observer",
                    "ts": us(e.now),
                    "pid": 0,
                    "tid": e.place.0,
                    "s": "t",
                    "args": {
                        "id": e.id.get(),
                        "outcome": outcome,
                        "frame": frame,
                        "visible": visible,
                    }
                }));
            }
            RecordedEvent::ObserverStopped(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "ObserverStopped",
                    "cat": "Observer",
                    "ts": us(e.now),
                    "pid": 0,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "id": e.id.get(),
                        "reason": format!("{:?}", e.reason),
                    }
                }));
            }
            RecordedEvent::Impression(e) => {
                let item = e.item.0;
                let ts = us(e.now);
                let event = match e.kind {
                    ImpressionEventKind::Rendered => json!({
                        "ph": "i",
                        "name": "Rendered",
                        "cat": "Impression",
                        "ts": ts,
                        "pid": 1,
                        "tid": 0,
                        "s": "p",
                        "args": { "item": item }
                    }),
                    ImpressionEventKind::TimerStarted { deadline } => json!({
                        "ph": "b",
                        "name": "ViewTimer",
                        "cat": "Impression",
                        "id": item,
                        "ts": ts,
                        "pid": 1,
                        "tid": 0,
                        "args": { "deadline_us": us(deadline) }
                    }),
                    ImpressionEventKind::OverlayCheckRequested => json!({
                        "ph": "n",
                        "name": "OverlayCheck",
                        "cat": "Impression",
                        "id": item,
                        "ts": ts,
                        "pid": 1,
                        "tid": 0,
                    }),
                    ImpressionEventKind::TimerCancelled => timer_end(item, ts, "cancelled", None),
                    ImpressionEventKind::OverlayAborted => timer_end(item, ts, "overlay", None),
                    ImpressionEventKind::Viewed { visibility } => {
                        timer_end(item, ts, "viewed", Some(visibility))
                    }
                };
                events.push(event);
            }
            RecordedEvent::OverlayPoll(e) => {
                events.push(json!({
                    "ph": "C",
                    "name": "Overlay",
                    "cat": "Presentation",
                    "ts": us(e.now),
                    "pid": 2,
                    "tid": 0,
                    "args": { "covered": u8::from(e.covered) }
                }));
                if e.dismissed {
                    events.push(json!({
                        "ph": "i",
                        "name": "Dismissed",
                        "cat": "Presentation",
                        "ts": us(e.now),
                        "pid": 2,
                        "tid": 0,
                        "s": "p",
                    }));
                }
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn timer_end(item: u64, ts: f64, outcome: &str, visibility: Option<f64>) -> Value {
    json!({
        "ph": "e",
        "name": "ViewTimer",
        "cat": "Impression",
        "id": item,
        "ts": ts,
        "pid": 1,
        "tid": 0,
        "args": {
            "outcome": outcome,
            "visibility": visibility,
        }
    })
}

fn us(t: HostTime) -> f64 {
    t.nanos() as f64 / 1000.0
}
