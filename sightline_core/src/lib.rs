// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Obstruction-aware visibility measurement and viewable-impression tracking.
//!
//! `sightline_core` measures how much of each element in a render tree a user
//! can actually see once viewport clipping and overlapping obstructors are
//! accounted for, and derives one-shot render and viewable-impression events
//! per logical item. It is `no_std` compatible (with `alloc`) and never reads
//! a clock: every timed entry point takes the current [`HostTime`] from the
//! host, which drives the whole pipeline from one cooperative loop.
//!
//! [`HostTime`]: time::HostTime
//!
//! # Architecture
//!
//! ```text
//!   LayerStore::evaluate() ──► FrameChanges ──► ObserverSet (debounce)
//!                                                     │
//!                 ┌───────────────────────────────────┘
//!                 ▼
//!   ObstructionRegistry ──► subscribers / RegistryObstructions
//!                                          │
//!                 ┌────────────────────────┘
//!                 ▼
//!   percentage_visible ──► ImpressionTracker ──► ImpressionHandler
//!                                 ▲
//!   PresentationDetector ─────────┘ (overlay gate)
//! ```
//!
//! **[`layer`]** — Struct-of-arrays render tree with generational handles.
//! Bounds, transforms, opacity, clips, and flags are set by the host; world
//! transforms, effective opacity and hidden state, and attachment are
//! computed by evaluation.
//!
//! **[`dirty`]** — Multi-channel dirty tracking via `understory_dirty`. The
//! drained channels become the [`FrameChanges`](layer::FrameChanges) signal
//! feed.
//!
//! **[`registry`]** — [`ObstructionRegistry`](registry::ObstructionRegistry),
//! the map from tracked element to its global frame, place, and own
//! visibility, with change subscriptions.
//!
//! **[`observer`]** — Debounced per-layer observers that keep the registry in
//! step with the render tree.
//!
//! **[`visibility`]** — The visible-fraction calculation and its
//! registry-backed and tree-walking obstructor strategies.
//!
//! **[`impression`]** — Per-item render and viewable-impression state
//! machine.
//!
//! **[`presentation`]** — Rate-limited overlay polling with an
//! edge-triggered dismissal signal.
//!
//! **[`deadline`]** — Keyed, cancellable single-shot deadlines used for
//! debouncing and impression timers.
//!
//! **[`time`]** / **[`transform`]** — Host time and the 3D affine transform
//! used for layer positioning.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types for
//! pipeline instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod deadline;
pub mod dirty;
pub mod impression;
pub mod layer;
pub mod observer;
pub mod presentation;
pub mod registry;
pub mod time;
pub mod trace;
pub mod transform;
pub mod visibility;
