mod region;
mod ring;
mod slice;
mod vec;

pub use region::*;
pub(crate) use ring::*;

/// Byte sinks the wire codec encodes into.
pub(crate) mod writer {
    /// Not enough room; nothing was written.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct DidntWrite;

    pub(crate) trait Writer {
        /// Copies as much of `bytes` as fits and returns how much that was.
        fn write(&mut self, bytes: &[u8]) -> usize;

        /// Copies all of `bytes`, or nothing if they do not fit.
        fn write_exact(&mut self, bytes: &[u8]) -> Result<(), DidntWrite> {
            if bytes.len() > self.remaining() {
                return Err(DidntWrite);
            }
            self.write(bytes);
            Ok(())
        }

        /// Room left, in bytes.
        fn remaining(&self) -> usize;
    }
}

/// Byte sources the wire codec decodes from.
pub(crate) mod reader {
    /// Not enough data; nothing was consumed.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct DidntRead;

    pub(crate) trait Reader {
        /// Fills `into` entirely, or consumes nothing if too few bytes are left.
        fn read_exact(&mut self, into: &mut [u8]) -> Result<(), DidntRead>;

        /// Bytes left to read.
        fn remaining(&self) -> usize;

        fn can_read(&self) -> bool {
            self.remaining() != 0
        }
    }
}
