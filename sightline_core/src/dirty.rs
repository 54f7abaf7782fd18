// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants for the render tree.
//!
//! Every property that can move an element, resize it, or change whether it
//! is seen has its own channel (via [`understory_dirty`]). Draining the
//! channels in [`LayerStore::evaluate`](crate::layer::LayerStore::evaluate)
//! is what produces the geometry and attachment notifications that frame
//! observers react to.
//!
//! - **Propagating** — [`TRANSFORM`] and [`OPACITY`] carry dependency edges
//!   from child to parent and are marked with
//!   [`EagerPolicy`](understory_dirty::EagerPolicy): a moved or faded parent
//!   moves or fades its whole subtree. Hidden-flag and mount changes ride on
//!   [`TRANSFORM`] so one drain pass recomputes world transforms, effective
//!   hidden state, and attachment together.
//! - **Local-only** — [`BOUNDS`] and [`CLIP`] only concern the marked layer.
//! - **Structural** — [`TOPOLOGY`] triggers a traversal-order rebuild.

use understory_dirty::Channel;

/// Transform, hidden flag, or attachment changed.
pub const TRANSFORM: Channel = Channel::new(0);

/// Opacity changed.
pub const OPACITY: Channel = Channel::new(1);

/// Clip shape changed.
pub const CLIP: Channel = Channel::new(2);

/// Local bounds changed.
pub const BOUNDS: Channel = Channel::new(3);

/// Tree topology changed.
pub const TOPOLOGY: Channel = Channel::new(4);
