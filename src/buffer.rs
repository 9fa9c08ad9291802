//! Data buffers flowing through the live graph.

use bytes::Bytes;

/// A unit of media data travelling from an input endpoint to one or more
/// output endpoints.
///
/// The routing core never inspects payloads; buffers are carried opaquely
/// and duplicated at splitter fan-out points. Cloning is cheap: the
/// payload is reference-counted.
#[derive(Debug, Clone)]
pub struct Buffer {
    data: Bytes,
    sequence: u64,
}

impl Buffer {
    /// Create a buffer from a payload and a sequence number.
    pub fn new(data: impl Into<Bytes>, sequence: u64) -> Self {
        Self {
            data: data.into(),
            sequence,
        }
    }

    /// Create an empty buffer carrying only a sequence number.
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            data: Bytes::new(),
            sequence,
        }
    }

    /// The buffer payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The sequence number assigned by the producing endpoint.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
