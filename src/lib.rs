//! # autoroute
//!
//! A caps-driven auto-routing bin: given input endpoints carrying typed
//! streams, output endpoints demanding typed streams, and a catalog of
//! single-input/single-output transform factories, autoroute plans the
//! minimum-cost conversion graph that satisfies every output — sharing
//! intermediate results through explicit fan-out — and swaps it in
//! atomically behind a drain protocol when the configuration changes.
//!
//! ## How planning works
//!
//! Factories are indexed once with their template caps and class masks.
//! For every route the planner first tries a passthrough, then walks
//! chain permutations of increasing length through a validator-pruned
//! odometer; surviving candidates are negotiated end to end in a sandbox
//! and costed. Proposals branch off each other's intermediate steps, and
//! a subset-cover dynamic program picks the cheapest set that feeds
//! every output.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use autoroute::prelude::*;
//!
//! let policy = Policy::with_factories(my_catalog);
//! let bin = AutoRouteBin::new(policy)?;
//!
//! let cam = bin.add_input("camera");
//! let enc = bin.add_output("encoded", h264_caps());
//!
//! bin.push_event(cam, Event::Caps(rgb_caps()))?; // plans and builds
//! bin.push_buffer(cam, Buffer::new(frame, 0))?;  // flows through the graph
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bin;
pub mod buffer;
pub mod caps;
pub mod element;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod graph;
pub mod policy;
pub mod routing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::bin::AutoRouteBin;
    pub use crate::buffer::Buffer;
    pub use crate::caps::{Caps, CapsStructure, FieldSpec, FieldValue};
    pub use crate::element::{Element, ElementFactory, TransformFactory};
    pub use crate::endpoint::{InputId, OutputId};
    pub use crate::error::{Error, Result};
    pub use crate::event::Event;
    pub use crate::policy::Policy;
}

pub use bin::AutoRouteBin;
pub use error::{Error, Result};
