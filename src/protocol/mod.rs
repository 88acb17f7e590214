pub(crate) mod header;
pub(crate) mod wqe;

pub(crate) use header::*;
pub use wqe::*;

/// Bits of the first header byte.
///
/// A valid frame carries exactly one direction bit and exactly one kind bit.
pub(crate) mod flag {
    /// Frame opens an operation on the peer's memory region.
    pub(crate) const REQUEST: u8 = 1 << 0;

    /// Frame answers an operation the peer opened on our memory region.
    pub(crate) const RESPONSE: u8 = 1 << 1;

    /// Operation copies remote memory into local memory.
    pub(crate) const READ: u8 = 1 << 2;

    /// Operation copies local memory into remote memory.
    pub(crate) const WRITE: u8 = 1 << 3;

    /// Bit mask of the direction bits.
    pub(crate) const DIRECTION: u8 = REQUEST | RESPONSE;

    /// Bit mask of the kind bits.
    pub(crate) const KIND: u8 = READ | WRITE;
}
