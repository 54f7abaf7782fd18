// Copyright 2026 the Sightline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render tree data model.
//!
//! A *layer* is one element of the render tree whose visibility can be
//! measured. Each layer has:
//!
//! - An identity ([`LayerId`]), a generational handle that becomes stale
//!   when the layer is destroyed. Observers hold these handles without
//!   extending the layer's lifetime.
//! - Topology: parent, first-child, and sibling links forming an ordered tree.
//! - **Local properties** set by the host: [`transform`](LayerStore::set_transform),
//!   [`opacity`](LayerStore::set_opacity), [`bounds`](LayerStore::set_bounds),
//!   [`clip`](LayerStore::set_clip), and [`flags`](LayerStore::set_flags).
//! - **Computed properties** produced by [`evaluate`](LayerStore::evaluate):
//!   world transform, effective opacity, effective hidden state, and
//!   attachment to the render surface (see [`LayerStore::mount`]).
//!
//! Global-space geometry comes from [`LayerStore::world_frame`] and
//! [`LayerStore::world_clip`].

mod clip;
mod evaluate;
mod id;
mod store;
mod traverse;

pub use clip::ClipShape;
pub use evaluate::FrameChanges;
pub use id::{INVALID, LayerId};
pub use store::{LayerFlags, LayerStore};
pub use traverse::Children;
