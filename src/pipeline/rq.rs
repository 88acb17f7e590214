use std::collections::VecDeque;

use super::error::Violation;
use crate::protocol::Wqe;

/// Peer requests waiting for their response, in arrival order.
///
/// Every entry already carries the terminal status its response reports.
#[derive(Debug)]
pub(crate) struct RemoteQueue {
    entries: VecDeque<Wqe>,
    capacity: usize,
}

impl RemoteQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, wqe: Wqe) -> Result<(), Violation> {
        if self.entries.len() >= self.capacity {
            return Err(Violation::RemoteQueueFull);
        }
        self.entries.push_back(wqe);
        Ok(())
    }

    pub(crate) fn front(&self) -> Option<&Wqe> {
        self.entries.front()
    }

    pub(crate) fn pop(&mut self) -> Option<Wqe> {
        self.entries.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
