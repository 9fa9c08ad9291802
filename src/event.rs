//! Events flowing through the bin alongside buffers.
//!
//! The routing core intercepts two event kinds: capability declarations on
//! input endpoints (which trigger planning once every input is described)
//! and the end-of-stream marker (which doubles as the drain acknowledgment
//! during a graph rebuild). Everything else passes through untouched.
//!
//! Sticky events are retained per input endpoint and replayed into a newly
//! built graph so downstream elements observe the same preroll sequence
//! the old graph saw.

use crate::caps::Caps;

/// Events travelling downstream through the live graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Start of a new stream, carrying a stable stream id.
    StreamStart {
        /// Stream identifier chosen by the producer.
        stream_id: String,
    },

    /// Concrete capability declaration for the stream that follows.
    Caps(Caps),

    /// Defines the playback segment (timeline position).
    Segment {
        /// Segment start position.
        start: u64,
    },

    /// End of stream — no more data will be produced.
    ///
    /// Also used internally as the drain marker while the bin swaps
    /// graphs.
    Eos,
}

impl Event {
    /// Whether this event is retained on the endpoint and replayed into a
    /// rebuilt graph.
    ///
    /// The end-of-stream marker is never sticky: replaying it would drain
    /// the new graph immediately.
    pub fn is_sticky(&self) -> bool {
        !matches!(self, Event::Eos)
    }

    /// A human-readable name for this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Event::StreamStart { .. } => "stream-start",
            Event::Caps(_) => "caps",
            Event::Segment { .. } => "segment",
            Event::Eos => "eos",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eos_is_not_sticky() {
        assert!(!Event::Eos.is_sticky());
        assert!(Event::Caps(Caps::new_empty()).is_sticky());
        assert!(Event::StreamStart {
            stream_id: "s0".into()
        }
        .is_sticky());
        assert!(Event::Segment { start: 0 }.is_sticky());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::Eos.name(), "eos");
        assert_eq!(Event::Segment { start: 0 }.name(), "segment");
    }
}
