//! The byte-stream service a connection runs on.
//!
//! The dataplane only needs to know how much it may send and receive and how
//! to move bytes in and out of the stream buffers. Framing, congestion control
//! and retransmission belong to the transport.
mod pipe;

pub use pipe::*;

/// A reliable, ordered byte stream with bounded send and receive buffers.
pub trait Transport: Send {
    /// Number of bytes that can be queued for sending right now.
    fn tx_free(&self) -> usize;

    /// Number of received bytes not consumed yet.
    fn rx_avail(&self) -> usize;

    /// Queues as many bytes of `bytes` as fit for sending and returns how many were queued.
    fn tx_copy(&mut self, bytes: &[u8]) -> usize;

    /// Copies received bytes starting `offset` bytes after the first unconsumed one into `dst`, without consuming
    /// them. Returns the number of bytes copied.
    fn rx_copy(&self, offset: usize, dst: &mut [u8]) -> usize;

    /// Drops `len` received bytes.
    fn rx_consume(&mut self, len: usize);

    /// Called after a pass queued `bytes` new bytes for sending.
    fn credit(&mut self, _bytes: usize) {}
}
