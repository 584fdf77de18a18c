//! Growable byte buffer with separate write-length and read-position cursors.
//!
//! Every [`Connection`](crate::connection::Connection) owns one buffer for the
//! content of the record being assembled, and every
//! [`WriteRequest`](crate::writer::WriteRequest) owns one for the outgoing
//! response bytes. Both are reused across requests, so [`Buffer::reset`] keeps
//! the backing storage.
//!
//! Invariant: `position <= len <= capacity`.

/// Capacity below which growth doubles the needed size.
pub const GROWTH_THRESHOLD: usize = 4096;

/// Append-only byte buffer.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    /// Backing storage; its length is the buffer capacity.
    data: Vec<u8>,
    /// Bytes written.
    length: usize,
    /// Bytes consumed by a reader.
    position: usize,
}

impl Buffer {
    /// Create an empty buffer without allocating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes, growing the backing storage if needed.
    ///
    /// New capacity is `2 * needed` below [`GROWTH_THRESHOLD`], otherwise
    /// `needed + GROWTH_THRESHOLD`. Slices previously borrowed from the buffer
    /// cannot outlive this call.
    pub fn append(&mut self, bytes: &[u8]) {
        let needed = self.length + bytes.len();
        if needed > self.data.len() {
            let capacity = if needed < GROWTH_THRESHOLD {
                2 * needed
            } else {
                needed + GROWTH_THRESHOLD
            };
            self.data.resize(capacity, 0);
        }
        self.data[self.length..needed].copy_from_slice(bytes);
        self.length = needed;
    }

    /// Logically empty the buffer. Storage is kept for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.length = 0;
        self.position = 0;
    }

    /// Allocated capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes written.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// True if nothing has been written since the last reset.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of bytes consumed by the reader.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes written but not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.length - self.position
    }

    /// All written bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Written bytes that the reader has not consumed yet.
    #[inline]
    pub fn unread(&self) -> &[u8] {
        &self.data[self.position..self.length]
    }

    /// Mark up to `n` unread bytes as consumed. Returns how many were consumed.
    pub fn advance(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining());
        self.position += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = Buffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_small_growth_doubles_needed() {
        let mut buf = Buffer::new();
        buf.append(b"hello");
        assert_eq!(buf.capacity(), 10);
        buf.append(b"world!");
        // needed = 11 > 10 -> 22
        assert_eq!(buf.capacity(), 22);
        assert_eq!(buf.as_slice(), b"helloworld!");
    }

    #[test]
    fn test_large_growth_adds_threshold() {
        let mut buf = Buffer::new();
        buf.append(&vec![7u8; 5000]);
        assert_eq!(buf.capacity(), 5000 + GROWTH_THRESHOLD);
        assert_eq!(buf.len(), 5000);
    }

    #[test]
    fn test_growth_preserves_existing_bytes() {
        let mut buf = Buffer::new();
        buf.append(b"abc");
        let big = vec![1u8; 10_000];
        buf.append(&big);
        assert_eq!(&buf.as_slice()[..3], b"abc");
        assert_eq!(buf.len(), 10_003);
    }

    #[test]
    fn test_append_within_capacity_does_not_grow() {
        let mut buf = Buffer::new();
        buf.append(b"0123456789");
        let cap = buf.capacity();
        buf.reset();
        buf.append(b"abc");
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn test_reset_keeps_storage() {
        let mut buf = Buffer::new();
        buf.append(b"some content");
        buf.advance(4);
        let cap = buf.capacity();

        buf.reset();

        assert!(buf.is_empty());
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn test_advance_is_clamped_to_remaining() {
        let mut buf = Buffer::new();
        buf.append(b"abcdef");

        assert_eq!(buf.advance(4), 4);
        assert_eq!(buf.unread(), b"ef");
        assert_eq!(buf.advance(100), 2);
        assert_eq!(buf.remaining(), 0);
        assert!(buf.position() <= buf.len() && buf.len() <= buf.capacity());
    }
}
