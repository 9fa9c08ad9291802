//! Splitter element - fans one input out to many identical outputs.

use super::Element;
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::error::Result;

/// An element that duplicates its input stream to every consumer.
///
/// The splitter itself passes buffers through while tracking statistics;
/// the actual duplication happens on the live graph's out-edges, which
/// clone the buffer once per successor. The instantiator inserts a
/// splitter wherever a planned graph fans out: on an input endpoint
/// consumed by more than one proposal, and after any chain step that
/// parents a branch.
pub struct Splitter {
    count: u64,
    caps: Option<Caps>,
}

impl Splitter {
    /// Create a new splitter.
    pub fn new() -> Self {
        Self { count: 0, caps: None }
    }

    /// Number of buffers that have passed through.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Splitter {
    fn factory_name(&self) -> &str {
        "splitter"
    }

    fn query_sink_caps(&self, downstream: &Caps) -> Caps {
        downstream.clone()
    }

    fn negotiate(&mut self, upstream: &Caps, _downstream: &Caps) -> bool {
        self.caps = Some(upstream.clone());
        true
    }

    fn sink_caps(&self) -> Option<&Caps> {
        self.caps.as_ref()
    }

    fn src_caps(&self) -> Option<&Caps> {
        self.caps.as_ref()
    }

    fn reset(&mut self) {
        self.caps = None;
        self.count = 0;
    }

    fn process(&mut self, buffer: Buffer) -> Result<Option<Buffer>> {
        self.count += 1;
        Ok(Some(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splitter_passes_buffers() {
        let mut splitter = Splitter::new();
        let out = splitter.process(Buffer::from_sequence(3)).unwrap();
        assert_eq!(out.unwrap().sequence(), 3);
        assert_eq!(splitter.count(), 1);
    }

    #[test]
    fn test_splitter_is_caps_transparent() {
        use crate::caps::CapsStructure;

        let caps = Caps::from(CapsStructure::new("video/raw").with_field("format", "rgb"));
        let splitter = Splitter::new();
        assert_eq!(splitter.query_sink_caps(&caps), caps);
    }
}
