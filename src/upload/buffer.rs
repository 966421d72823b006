//! Part buffer
//!
//! Linear byte accumulation with a size probe. Handing bytes out never copies:
//! the buffer splits its `BytesMut` and freezes the front half.

use bytes::{Bytes, BytesMut};

/// Bytes received since the last part was cut
#[derive(Debug, Default)]
pub struct PartBuffer {
    inner: BytesMut,
}

impl PartBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the buffer for roughly one part
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Append a chunk. Zero-length chunks are ignored.
    pub fn append(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.inner.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Cut exactly `part_size` bytes off the front, if that many are buffered
    pub fn take_part(&mut self, part_size: usize) -> Option<Bytes> {
        if part_size == 0 || self.inner.len() < part_size {
            return None;
        }
        Some(self.inner.split_to(part_size).freeze())
    }

    /// Hand out everything buffered and leave the buffer empty
    pub fn take_and_reset(&mut self) -> Bytes {
        self.inner.split().freeze()
    }
}
