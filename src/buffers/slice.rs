use core::mem;

use super::{
    reader::{DidntRead, Reader},
    writer::Writer,
};

// A slice is a cursor: writing or reading shrinks it from the front

impl Writer for &mut [u8] {
    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.len());
        let (dst, rest) = mem::take(self).split_at_mut(n);
        dst.copy_from_slice(&bytes[..n]);
        *self = rest;
        n
    }

    fn remaining(&self) -> usize {
        self.len()
    }
}

impl Reader for &[u8] {
    fn read_exact(&mut self, into: &mut [u8]) -> Result<(), DidntRead> {
        if self.len() < into.len() {
            return Err(DidntRead);
        }
        let (src, rest) = self.split_at(into.len());
        into.copy_from_slice(src);
        *self = rest;
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.len()
    }
}
