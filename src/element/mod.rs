//! Element and factory abstractions.
//!
//! Elements are the single-input/single-output transformation units the
//! routing core assembles into chains. They are created by
//! [`ElementFactory`] implementations supplied through the policy catalog,
//! negotiated against concrete caps, and then either exercised in the
//! planner's sandbox or linked into the live graph.

mod nullsink;
mod splitter;
mod transform;

pub use nullsink::NullSink;
pub use splitter::Splitter;
pub use transform::{CapsTransform, TransformFactory};

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::error::Result;

/// Direction of a pad (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// A sink pad (receives buffers from upstream).
    Sink,
    /// A src pad (sends buffers downstream).
    Src,
}

/// Template describing a pad an element exposes.
///
/// Templates carry the static caps used to index factories and prune
/// chain candidates before anything is instantiated.
#[derive(Debug, Clone)]
pub struct PadTemplate {
    name: String,
    direction: PadDirection,
    caps: Caps,
}

impl PadTemplate {
    /// Create a template.
    pub fn new(name: impl Into<String>, direction: PadDirection, caps: Caps) -> Self {
        Self {
            name: name.into(),
            direction,
            caps,
        }
    }

    /// Create a sink-pad template.
    pub fn sink(caps: Caps) -> Self {
        Self::new("sink", PadDirection::Sink, caps)
    }

    /// Create a src-pad template.
    pub fn src(caps: Caps) -> Self {
        Self::new("src", PadDirection::Src, caps)
    }

    /// The pad name pattern.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pad direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// The template caps.
    pub fn caps(&self) -> &Caps {
        &self.caps
    }
}

/// Constructor for transformation elements.
///
/// The routing core only indexes factories exposing exactly one sink
/// template and one src template; anything else is skipped during
/// indexing.
pub trait ElementFactory: Send + Sync {
    /// Unique factory name.
    fn name(&self) -> &str;

    /// Classification string. May contain the tokens `Parser`, `Decoder`,
    /// `Converter` and `Encoder`, which drive the chain-ordering
    /// validator.
    fn classification(&self) -> &str;

    /// The pad templates this factory's elements expose.
    fn pad_templates(&self) -> &[PadTemplate];

    /// Create a fresh element instance.
    fn create(&self) -> Box<dyn Element>;
}

/// A live transformation element.
///
/// Elements negotiate concrete caps before any data flows: the planner
/// drives [`Element::negotiate`] in its sandbox to cost candidate chains,
/// and the instantiator repeats it with the planned caps when the live
/// graph is built.
pub trait Element: Send {
    /// Name of the factory that created this element.
    fn factory_name(&self) -> &str;

    /// Caps this element accepts on its sink side, given the caps its
    /// downstream peer accepts.
    ///
    /// Returns empty caps when the element cannot produce anything the
    /// peer would take, which prunes the chain before negotiation.
    fn query_sink_caps(&self, downstream: &Caps) -> Caps;

    /// Negotiate concrete caps.
    ///
    /// `upstream` is the (fixated) caps offered on the sink side;
    /// `downstream` is what the downstream peer accepts. On success the
    /// element stores a fixated caps set per side, readable through
    /// [`Element::sink_caps`] and [`Element::src_caps`].
    fn negotiate(&mut self, upstream: &Caps, downstream: &Caps) -> bool;

    /// Fixated sink-side caps after a successful negotiation.
    fn sink_caps(&self) -> Option<&Caps>;

    /// Fixated src-side caps after a successful negotiation.
    fn src_caps(&self) -> Option<&Caps>;

    /// Drop any negotiated state so the instance can be reused.
    fn reset(&mut self);

    /// Process one buffer, producing at most one output buffer.
    fn process(&mut self, buffer: Buffer) -> Result<Option<Buffer>>;
}
