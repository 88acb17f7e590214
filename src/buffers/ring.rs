use core::{fmt, ops::Range};

use super::{
    reader::{DidntRead, Reader},
    writer::Writer,
};

/// A fixed-capacity circular byte buffer.
///
/// Bytes are appended at the tail and consumed from the head. Copies that
/// cross the end of the storage are split in two, so callers always see a
/// contiguous byte stream.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct ByteRing {
    buffer: Box<[u8]>,
    head: usize,
    len: usize,
}

impl ByteRing {
    /// Creates an empty ring able to hold `capacity` bytes.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of bytes stored.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes that can still be appended.
    pub(crate) const fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Returns the two storage ranges holding `len` bytes starting `offset` bytes after the head.
    fn spans(&self, offset: usize, len: usize) -> (Range<usize>, Range<usize>) {
        let cap = self.capacity();
        let start = (self.head + offset) % cap.max(1);
        let first = len.min(cap - start);
        (start..start + first, 0..len - first)
    }

    /// Copies `dst.len()` bytes starting `offset` bytes after the head without consuming them.
    ///
    /// # Errors
    ///
    /// Returns `DidntRead` if fewer than `offset + dst.len()` bytes are stored.
    pub(crate) fn peek_at(&self, offset: usize, dst: &mut [u8]) -> Result<(), DidntRead> {
        if offset + dst.len() > self.len {
            return Err(DidntRead);
        }
        let (a, b) = self.spans(offset, dst.len());
        let (da, db) = dst.split_at_mut(a.len());
        da.copy_from_slice(&self.buffer[a]);
        db.copy_from_slice(&self.buffer[b]);
        Ok(())
    }

    /// Drops up to `len` bytes from the head, returning how many were dropped.
    pub(crate) fn consume(&mut self, len: usize) -> usize {
        let len = len.min(self.len);
        if len > 0 {
            self.head = (self.head + len) % self.capacity();
            self.len -= len;
        }
        len
    }

    /// Moves every stored byte to the end of `out`.
    pub(crate) fn drain_into(&mut self, out: &mut Vec<u8>) -> usize {
        let len = self.len;
        let (a, b) = self.spans(0, len);
        out.extend_from_slice(&self.buffer[a]);
        out.extend_from_slice(&self.buffer[b]);
        self.consume(len)
    }

}

impl fmt::Debug for ByteRing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ByteRing")
            .field("capacity", &self.capacity())
            .field("head", &self.head)
            .field("len", &self.len)
            .finish()
    }
}

impl Writer for ByteRing {
    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        let (a, b) = self.spans(self.len, n);
        let (sa, sb) = bytes[..n].split_at(a.len());
        self.buffer[a].copy_from_slice(sa);
        self.buffer[b].copy_from_slice(sb);
        self.len += n;
        n
    }

    fn remaining(&self) -> usize {
        self.free()
    }
}

impl Reader for ByteRing {
    fn read_exact(&mut self, into: &mut [u8]) -> Result<(), DidntRead> {
        self.peek_at(0, into)?;
        self.consume(into.len());
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn wraparound_preserves_order() {
        const CAPACITY: usize = 13;

        let mut rng = rand::rng();
        let mut ring = ByteRing::with_capacity(CAPACITY);
        let mut expected = std::collections::VecDeque::new();
        let mut next = 0u8;

        for _ in 0..1_000 {
            // Append a random amount, as much as fits
            let n = rng.random_range(0..=ring.free());
            let chunk: Vec<u8> = (0..n)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            ring.write_exact(&chunk).unwrap();
            expected.extend(chunk);
            assert_eq!(ring.len(), expected.len());

            // Peek somewhere in the middle
            if ring.len() > 1 {
                let off = rng.random_range(0..ring.len());
                let mut one = [0u8];
                ring.peek_at(off, &mut one).unwrap();
                assert_eq!(one[0], expected[off]);
            }

            // Consume a random amount
            let m = rng.random_range(0..=ring.len());
            let mut out = vec![0u8; m];
            ring.read_exact(&mut out).unwrap();
            let want: Vec<u8> = expected.drain(..m).collect();
            assert_eq!(out, want);
        }
    }

    #[test]
    fn drain_and_bounds() {
        let mut ring = ByteRing::with_capacity(8);
        assert!(ring.is_empty());
        ring.write_exact(&[1, 2, 3, 4, 5, 6]).unwrap();
        ring.consume(4);
        ring.write_exact(&[7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(ring.free(), 0);

        // Full: exact writes are rejected and nothing is written
        assert!(ring.write_exact(&[0]).is_err());
        assert_eq!(ring.write(&[0]), 0);

        // Reading past the end is rejected
        let mut big = [0u8; 9];
        assert!(ring.peek_at(0, &mut big).is_err());

        let mut out = vec![];
        assert_eq!(ring.drain_into(&mut out), 8);
        assert_eq!(out, vec![5, 6, 7, 8, 9, 10, 11, 12]);
        assert!(ring.is_empty());
        assert_eq!(ring.consume(1), 0);
    }
}
