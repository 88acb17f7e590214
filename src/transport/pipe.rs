use std::fmt;

use super::Transport;
use crate::{
    buffers::{ByteRing, writer::Writer},
    sync::event::Notifier,
};

/// An in-memory [`Transport`] made of two bounded byte rings.
///
/// Whoever drives the pipe moves inbound bytes in with [`push_rx`](Self::push_rx) and outbound bytes out with
/// [`drain_tx`](Self::drain_tx). Connections built with [`connection()`](crate::connection) drive their pipe from a
/// [`DataplaneTask`](crate::DataplaneTask); two pipes can also be wired back to back by hand.
pub struct Pipe {
    tx: ByteRing,
    rx: ByteRing,
    credit: Option<Notifier>,
}

impl Pipe {
    /// Creates a pipe with `tx_buffer` bytes of send buffer and `rx_buffer` bytes of receive buffer.
    pub fn new(tx_buffer: usize, rx_buffer: usize) -> Self {
        Self {
            tx: ByteRing::with_capacity(tx_buffer),
            rx: ByteRing::with_capacity(rx_buffer),
            credit: None,
        }
    }

    /// Wakes `notifier` whenever new bytes are queued for sending.
    pub(crate) fn with_credit(mut self, notifier: Notifier) -> Self {
        self.credit = Some(notifier);
        self
    }

    /// Appends inbound bytes and returns how many fit in the receive buffer.
    pub fn push_rx(&mut self, bytes: &[u8]) -> usize {
        self.rx.write(bytes)
    }

    /// Moves every queued outbound byte to the end of `out` and returns how many were moved.
    pub fn drain_tx(&mut self, out: &mut Vec<u8>) -> usize {
        self.tx.drain_into(out)
    }

    /// Number of outbound bytes waiting to be drained.
    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }
}

impl Transport for Pipe {
    fn tx_free(&self) -> usize {
        self.tx.free()
    }

    fn rx_avail(&self) -> usize {
        self.rx.len()
    }

    fn tx_copy(&mut self, bytes: &[u8]) -> usize {
        self.tx.write(bytes)
    }

    fn rx_copy(&self, offset: usize, dst: &mut [u8]) -> usize {
        let len = dst.len().min(self.rx.len().saturating_sub(offset));
        match self.rx.peek_at(offset, &mut dst[..len]) {
            Ok(()) => len,
            Err(_) => 0,
        }
    }

    fn rx_consume(&mut self, len: usize) {
        self.rx.consume(len);
    }

    fn credit(&mut self, _bytes: usize) {
        if let Some(n) = self.credit.as_ref() {
            // The task may be gone already, in which case nobody drains anyway
            let _ = n.notify();
        }
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe").field("tx", &self.tx).field("rx", &self.rx).finish()
    }
}
