use std::ops::{Deref, DerefMut};

/// Fixed-size, reusable receive buffer.
///
/// Allocated once per connection and overwritten by every receive; the
/// consumer only ever sees the filled prefix of it.
#[derive(Debug)]
pub struct InboundScratch {
    buf: Box<[u8]>,
}

impl InboundScratch {
    /// Allocate a zeroed scratch buffer of `size` bytes (at least one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size.max(1)].into_boxed_slice(),
        }
    }

    /// The filled prefix after a receive of `n` bytes.
    #[must_use]
    pub fn filled(&self, n: usize) -> &[u8] {
        &self.buf[..n.min(self.buf.len())]
    }
}

impl Deref for InboundScratch {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for InboundScratch {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}
