// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated scrolling feed that exercises the whole viewability pipeline.
//!
//! A 320x480 window holds a sticky 60pt header (an observed obstructor) above
//! a scrolling list of rows. The host loop runs at 60 Hz for four seconds,
//! scrolls the list once, and briefly presents a modal overlay. Events go to
//! both a [`PrettyPrintSink`] and a [`RecorderSink`]; the recording is
//! exported as a Chrome trace JSON file.

use std::fs::File;
use std::io::BufWriter;

use kurbo::Rect;
use sightline_core::impression::{
    ImpressionConfig, ImpressionHandler, ImpressionTracker, ItemId,
};
use sightline_core::layer::{ClipShape, LayerFlags, LayerId, LayerStore};
use sightline_core::observer::{ObserverConfig, ObserverSet};
use sightline_core::presentation::{PresentationConfig, PresentationDetector};
use sightline_core::registry::{ObstructionRegistry, Place};
use sightline_core::time::{Duration, HostTime};
use sightline_core::trace::{
    ImpressionEvent, ObserverStoppedEvent, OverlayPollEvent, RecomputeEvent, TraceSink, Tracer,
};
use sightline_core::transform::Transform3d;
use sightline_core::visibility::RegistryObstructions;

use sightline_debug::pretty::PrettyPrintSink;
use sightline_debug::recorder::RecorderSink;

const FEED: Place = Place(1);
const FRAME_COUNT: u64 = 240;
/// 16.6ms refresh interval in nanoseconds (≈60 Hz).
const REFRESH_INTERVAL_NS: u64 = 16_666_667;
const ROW_COUNT: u64 = 6;
const ROW_HEIGHT: f64 = 120.0;
const ROW_PITCH: f64 = 130.0;
const HEADER_HEIGHT: f64 = 60.0;
const WINDOW: Rect = Rect::new(0.0, 0.0, 320.0, 480.0);

/// Forwards every event to both sinks.
struct Tee {
    pretty: PrettyPrintSink,
    recorder: RecorderSink,
}

impl TraceSink for Tee {
    fn on_recompute(&mut self, e: &RecomputeEvent) {
        self.pretty.on_recompute(e);
        self.recorder.on_recompute(e);
    }

    fn on_observer_stopped(&mut self, e: &ObserverStoppedEvent) {
        self.pretty.on_observer_stopped(e);
        self.recorder.on_observer_stopped(e);
    }

    fn on_impression(&mut self, e: &ImpressionEvent) {
        self.pretty.on_impression(e);
        self.recorder.on_impression(e);
    }

    fn on_overlay_poll(&mut self, e: &OverlayPollEvent) {
        // Overlay samples are too chatty for the console.
        self.recorder.on_overlay_poll(e);
    }
}

#[derive(Default)]
struct Views {
    fired: Vec<(ItemId, f64, HostTime)>,
    now: HostTime,
}

impl ImpressionHandler for Views {
    fn on_view(&mut self, item: ItemId, visibility: f64) {
        self.fired.push((item, visibility, self.now));
    }
}

/// Scroll offset over time: rest for 1.5 s, scroll 300pt over 0.5 s, rest.
fn scroll_offset(t: Duration) -> f64 {
    let secs = t.as_secs_f64();
    let progress = ((secs - 1.5) / 0.5).clamp(0.0, 1.0);
    300.0 * progress
}

/// A modal covers the feed between 2.5 s and 3.3 s.
fn modal_presented(t: Duration) -> bool {
    let secs = t.as_secs_f64();
    (2.5..3.3).contains(&secs)
}

fn main() {
    // -- sinks -------------------------------------------------------------
    let mut tee = Tee {
        pretty: PrettyPrintSink::new(Box::new(std::io::stdout())),
        recorder: RecorderSink::new(),
    };

    // -- render tree -------------------------------------------------------
    let mut store = LayerStore::new();
    let window = store.create_layer();
    let content = store.create_layer();
    let header = store.create_layer();
    store.add_child(window, content);
    store.add_child(window, header);
    store.set_clip(window, Some(ClipShape::Rect(WINDOW)));
    store.set_bounds(header, Rect::new(0.0, 0.0, WINDOW.width(), HEADER_HEIGHT));
    store.set_flags(
        header,
        LayerFlags {
            obstructor: true,
            ..LayerFlags::default()
        },
    );

    let rows: Vec<(ItemId, LayerId)> = (0..ROW_COUNT)
        .map(|i| {
            let row = store.create_layer();
            store.add_child(content, row);
            store.set_bounds(row, Rect::new(0.0, 0.0, WINDOW.width(), ROW_HEIGHT));
            let y = HEADER_HEIGHT + 10.0 + ROW_PITCH * i as f64;
            store.set_transform(row, Transform3d::from_translation(0.0, y, 0.0));
            (ItemId(i), row)
        })
        .collect();
    store.mount(window);

    // -- pipeline ----------------------------------------------------------
    let mut registry = ObstructionRegistry::new();
    let mut observers = ObserverSet::new(ObserverConfig::default());
    let mut tracker = ImpressionTracker::new(ImpressionConfig::default(), Views::default());
    let mut detector = PresentationDetector::new(PresentationConfig::default());

    let start = HostTime(1_000_000_000); // start at 1s
    let mut tracer = Tracer::new(&mut tee);
    observers.observe(header, FEED, start, &mut registry);

    // -- simulated loop ----------------------------------------------------
    for frame_index in 0..FRAME_COUNT {
        let now = HostTime(start.nanos() + frame_index * REFRESH_INTERVAL_NS);
        let elapsed = now - start;

        // 1. Host mutates the tree.
        let offset = scroll_offset(elapsed);
        store.set_transform(content, Transform3d::from_translation(0.0, -offset, 0.0));

        // 2. Evaluate and feed the observers.
        let changes = store.evaluate();
        observers.handle_changes(&changes, &store, now, &mut registry, &mut tracer);
        observers.poll(now, &store, &mut registry, &mut tracer);
        detector.follow_attachment(&store, window, now);

        // 3. Sample the overlay.
        let modal = modal_presented(elapsed);
        detector.poll(now, &mut || modal, &mut tracer);

        // 4. Measure every row against the registered header.
        let strategy = RegistryObstructions::new(&registry, FEED);
        for &(item, row) in &rows {
            let viewport = store.world_clip(row).unwrap_or(WINDOW);
            tracker.sample(
                item,
                store.world_frame(row),
                viewport,
                &strategy,
                now,
                &mut tracer,
            );
        }

        // 5. Elapsed timers, gated by the overlay.
        tracker.handler_mut().now = now;
        tracker.advance_with(now, &mut detector, &mut tracer);
    }

    let end = HostTime(start.nanos() + FRAME_COUNT * REFRESH_INTERVAL_NS);
    observers.stop_all(end, &mut registry, &mut tracer);
    drop(tracer);

    // -- report --------------------------------------------------------------
    for (item, visibility, at) in &tracker.handler().fired {
        let secs = (*at - start).as_secs_f64();
        println!("item {} viewed at {secs:.3}s with visibility {visibility:.3}", item.0);
    }
    for (item, _) in &rows {
        if !tracker.has_fired_view_impression(*item) {
            println!("item {} never earned a view impression", item.0);
        }
    }

    // -- export Chrome trace -----------------------------------------------
    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    sightline_debug::chrome::export(tee.recorder.as_bytes(), &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({FRAME_COUNT} frames)");
}
