use bytes::{Buf, BytesMut};

/// Growable queue of bytes accepted for sending but not yet written.
///
/// Bytes leave from the front in the order they were pushed, so the buffered
/// contents are always a suffix of everything pushed so far. Consuming does
/// not give memory back; [`release`](Self::release) does.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    buf: BytesMut,
}

impl OutboundBuffer {
    /// Create an empty buffer. No memory is allocated until the first push.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append bytes to the back of the queue.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// The bytes waiting to be written, front first.
    #[must_use]
    pub fn chunk(&self) -> &[u8] {
        &self.buf
    }

    /// Drop `n` bytes from the front after they were handed to the kernel.
    ///
    /// `n` is clamped to the buffered length.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes the buffer can hold without reallocating.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Discard buffered bytes and free the backing storage.
    ///
    /// Returns the number of bytes that were discarded.
    pub fn release(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf = BytesMut::new();
        dropped
    }
}
