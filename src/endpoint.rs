//! Endpoint identities and per-endpoint state.
//!
//! Endpoints are the bin's outward-facing ports. Inputs receive buffers
//! and events from upstream producers; outputs deliver to downstream
//! consumers. Both are identified by small stable ids handed out by the
//! bin at creation time and used throughout planning and instantiation.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::event::Event;

/// Identifier of an input endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub(crate) u32);

impl InputId {
    /// The underlying index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of an output endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub(crate) u32);

impl OutputId {
    /// The underlying index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// State of one input endpoint.
pub(crate) struct InputEndpoint {
    pub(crate) name: String,
    /// Concrete caps declared by the upstream producer, once known.
    pub(crate) current_caps: Option<Caps>,
    /// Sticky events, replayed into a rebuilt graph. At most one per
    /// event kind; a newer event replaces its predecessor.
    pub(crate) sticky: Vec<Event>,
}

impl InputEndpoint {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            current_caps: None,
            sticky: Vec::new(),
        }
    }

    pub(crate) fn store_sticky(&mut self, event: Event) {
        debug_assert!(event.is_sticky());
        let kind = std::mem::discriminant(&event);
        if let Some(slot) = self
            .sticky
            .iter_mut()
            .find(|e| std::mem::discriminant(&**e) == kind)
        {
            *slot = event;
        } else {
            self.sticky.push(event);
        }
    }
}

/// State of one output endpoint.
pub(crate) struct OutputEndpoint {
    pub(crate) name: String,
    /// Caps the downstream consumer advertises as acceptable.
    pub(crate) accepted: Caps,
    /// Latched when the downstream consumer wants a new graph.
    pub(crate) needs_reconfigure: bool,
    /// Buffers delivered through the live graph, awaiting the host.
    pub(crate) buffers: Vec<Buffer>,
    /// Events delivered through the live graph, awaiting the host.
    pub(crate) events: Vec<Event>,
}

impl OutputEndpoint {
    pub(crate) fn new(name: String, accepted: Caps) -> Self {
        Self {
            name,
            accepted,
            needs_reconfigure: false,
            buffers: Vec::new(),
            events: Vec::new(),
        }
    }
}
