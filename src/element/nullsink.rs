//! Null sink - terminates input endpoints no selected proposal consumes.

use super::Element;
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::error::Result;

/// A sink that discards all buffers.
///
/// Every input endpoint of the bin must feed something; inputs the
/// selector left without a consumer are routed here so their upstream
/// producers keep flowing.
pub struct NullSink {
    count: u64,
    caps: Option<Caps>,
}

impl NullSink {
    /// Create a new null sink.
    pub fn new() -> Self {
        Self { count: 0, caps: None }
    }

    /// Number of buffers swallowed.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for NullSink {
    fn factory_name(&self) -> &str {
        "nullsink"
    }

    fn query_sink_caps(&self, _downstream: &Caps) -> Caps {
        self.caps.clone().unwrap_or_default()
    }

    fn negotiate(&mut self, upstream: &Caps, _downstream: &Caps) -> bool {
        self.caps = Some(upstream.clone());
        true
    }

    fn sink_caps(&self) -> Option<&Caps> {
        self.caps.as_ref()
    }

    fn src_caps(&self) -> Option<&Caps> {
        None
    }

    fn reset(&mut self) {
        self.caps = None;
        self.count = 0;
    }

    fn process(&mut self, _buffer: Buffer) -> Result<Option<Buffer>> {
        self.count += 1;
        Ok(None)
    }
}
