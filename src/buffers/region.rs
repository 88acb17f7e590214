use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

use crate::pipeline::error::Error;

/// The memory region a connection exposes to its peer.
///
/// The region has a fixed length for the life of the connection. It is shared
/// between the application and the dataplane, so bytes are stored as atomics
/// and may be accessed concurrently without data races. Ordering between a
/// region update and its visibility to the peer is given by the work ring:
/// a payload is copied before the entry carrying it is published.
pub struct MemoryRegion {
    bytes: Box<[AtomicU8]>,
}

impl MemoryRegion {
    pub(crate) fn new(len: u32) -> Self {
        Self {
            bytes: (0..len).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn range(&self, offset: u32, len: usize) -> Result<std::ops::Range<usize>, Error> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(Error::InvalidOffset {
                offset,
                len: u32::try_from(len).unwrap_or(u32::MAX),
                mr_len: self.len(),
            }),
        }
    }

    /// Copies `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOffset`] if the range exceeds the region.
    pub fn read_at(&self, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        let range = self.range(offset, buf.len())?;
        for (dst, src) in buf.iter_mut().zip(&self.bytes[range]) {
            *dst = src.load(Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copies `bytes` into the region starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOffset`] if the range exceeds the region.
    pub fn write_at(&self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        let range = self.range(offset, bytes.len())?;
        for (dst, src) in self.bytes[range].iter().zip(bytes) {
            dst.store(*src, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_bounds() {
        let mr = MemoryRegion::new(16);
        assert_eq!(mr.len(), 16);

        mr.write_at(12, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        mr.read_at(12, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        // One byte past the end
        assert_eq!(
            mr.write_at(13, &[0; 4]),
            Err(Error::InvalidOffset {
                offset: 13,
                len: 4,
                mr_len: 16
            })
        );
        assert!(mr.read_at(u32::MAX, &mut out).is_err());

        // Empty ranges at the end are fine
        mr.read_at(16, &mut []).unwrap();
    }
}
