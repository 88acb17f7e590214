//! The dataplane side of a connection.
//!
//! A [`Dataplane`] owns `wq_tail` and `cq_head` of the work ring, the remote
//! request queue and the partial frame state of both directions. Every entry
//! point runs under the connection lock, so passes never overlap.
use std::sync::{Arc, LazyLock};

use tracing::{debug, error, warn};

pub(crate) mod error;
mod completion;
pub(crate) mod ring;
mod rq;
mod rx;
mod tx;

use error::Error;
use ring::{Boundaries, RingUpdate, WorkRing};
use rq::RemoteQueue;
use rx::RxState;
use tx::TxState;

use crate::{buffers::MemoryRegion, protocol::WqeStatus, sync::event::Notifier, transport::Transport};

pub(crate) static LOCAL_EPOCH: LazyLock<quanta::Instant> = LazyLock::new(quanta::Instant::now);

/// Size of the stack buffer payloads are copied through.
const CHUNK: usize = 4096;

pub(crate) struct Dataplane<T> {
    ring: Arc<WorkRing>,
    mr: Arc<MemoryRegion>,
    transport: T,
    /// Application boundaries as of the last accepted bump, plus our own.
    bounds: Boundaries,
    rq: RemoteQueue,
    tx: TxState,
    rx: RxState,
    failure: Option<Error>,
    /// Wakes the application when completions become visible.
    notifier: Notifier,
}

impl<T: Transport> Dataplane<T> {
    pub(crate) fn new(
        ring: Arc<WorkRing>,
        mr: Arc<MemoryRegion>,
        transport: T,
        remote_capacity: usize,
        notifier: Notifier,
    ) -> Self {
        Self {
            ring,
            mr,
            transport,
            bounds: Boundaries::default(),
            rq: RemoteQueue::new(remote_capacity),
            tx: TxState::default(),
            rx: RxState::default(),
            failure: None,
            notifier,
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[cfg(test)]
    pub(crate) fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Installs the application boundaries after validating them.
    ///
    /// Posting on a failed connection is refused, but draining completions
    /// (moving only `cq_tail`) is always allowed.
    pub(crate) fn bump(&mut self, new_wq_head: u32, new_cq_tail: u32) -> Result<(), Error> {
        let posting = new_wq_head != self.bounds.wq_head;
        if let Some(e) = self.failure.as_ref().filter(|_| posting) {
            return Err(e.clone());
        }

        let len = self.ring.len();
        let accepted = match self.bounds.bump(len, new_wq_head, new_cq_tail) {
            Ok(b) => b,
            Err(v) => {
                warn!("Rejected bump: {v}");
                let e = Error::from(v);
                self.fail(e.clone());
                return Err(e);
            }
        };

        let was_idle = self.bounds.wq_head == self.bounds.wq_tail;
        self.bounds = accepted;
        self.ring.publish_bump(new_wq_head, new_cq_tail);

        // Newly posted work on an idle ring goes out right away
        if self.failure.is_none() && was_idle && new_wq_head != self.bounds.wq_tail {
            let cq_head = self.bounds.cq_head;
            let res = self.transmit();
            self.publish(cq_head);
            res?;
        }
        Ok(())
    }

    /// Runs one receive pass followed by one transmit pass.
    pub(crate) fn poll(&mut self) -> Result<(), Error> {
        if let Some(e) = self.failure.clone() {
            return Err(e);
        }

        let cq_head = self.bounds.cq_head;
        let res = self.receive().and_then(|_| self.transmit());
        self.publish(cq_head);
        res
    }

    fn receive(&mut self) -> Result<(), Error> {
        self.rx_pass().inspect_err(|e| self.fail(e.clone()))
    }

    fn transmit(&mut self) -> Result<(), Error> {
        let before = self.transport.tx_free();
        self.tx_pass().inspect_err(|e| self.fail(e.clone()))?;
        self.settle();

        let queued = before.saturating_sub(self.transport.tx_free());
        if queued > 0 {
            self.transport.credit(queued);
        }
        Ok(())
    }

    /// Publishes our boundaries and wakes the application if `cq_head` moved since `prev_cq_head`.
    fn publish(&mut self, prev_cq_head: u32) {
        self.ring.publish(RingUpdate {
            wq_tail: self.bounds.wq_tail,
            cq_head: self.bounds.cq_head,
        });
        if self.bounds.cq_head != prev_cq_head {
            let _ = self.notifier.notify();
        }
    }

    /// Fails the connection.
    ///
    /// Every entry not completed yet completes with
    /// [`ConnFailure`](WqeStatus::ConnFailure) and becomes visible to the
    /// application. Only the first failure is kept.
    pub(crate) fn fail(&mut self, err: Error) {
        if self.failure.is_some() {
            return;
        }
        error!("Connection failed: {err}");

        let prev = self.bounds.cq_head;
        let mut off = self.bounds.cq_head;
        let mut flushed = 0;
        while off != self.bounds.wq_head {
            if !self.ring.status(off).is_terminal() {
                self.ring.set_status(off, WqeStatus::ConnFailure);
                flushed += 1;
            }
            off = self.ring.next(off);
        }
        debug!("Flushed {flushed} outstanding entries");

        self.bounds.wq_tail = self.bounds.wq_head;
        self.bounds.cq_head = self.bounds.wq_head;
        self.failure = Some(err);
        self.publish(prev);
    }
}
